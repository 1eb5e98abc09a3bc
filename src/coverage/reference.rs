//! CPU evaluation of the coverage program
//!
//! Mirrors the generated WGSL step for step with the same constants. Useful
//! for checking what a surface point should look like without a GPU and
//! for picking which cameras see a point.

use super::program::{COVERED_HEMISPHERE_WEIGHT, OVERLAP_TINT, SHADOW_BIAS, SINGLE_TINT};
use super::uniforms::CameraSlot;
use crate::scene::SceneLighting;
use glam::{Vec2, Vec3};

/// Source of stored depth for one camera, sampled in texture space
pub trait DepthSampler {
    fn closest_depth(&self, uv: Vec2) -> f32;
}

impl<F: Fn(Vec2) -> f32> DepthSampler for F {
    fn closest_depth(&self, uv: Vec2) -> f32 {
        self(uv)
    }
}

/// Square depth image sampled with nearest filtering and clamped edges
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    resolution: u32,
    texels: Vec<f32>,
}

impl DepthImage {
    /// Image at uniform `depth`
    pub fn filled(resolution: u32, depth: f32) -> Self {
        let resolution = resolution.max(1);
        Self {
            resolution,
            texels: vec![depth; (resolution * resolution) as usize],
        }
    }
}

impl DepthSampler for DepthImage {
    fn closest_depth(&self, uv: Vec2) -> f32 {
        let max = (self.resolution - 1) as f32;
        let x = (uv.x * self.resolution as f32).floor().clamp(0.0, max) as u32;
        let y = (uv.y * self.resolution as f32).floor().clamp(0.0, max) as u32;
        self.texels[(y * self.resolution + x) as usize]
    }
}

/// How many cameras see a point, bucketed the way it is tinted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageClass {
    None,
    Single,
    Overlap,
}

impl CoverageClass {
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => CoverageClass::None,
            1 => CoverageClass::Single,
            _ => CoverageClass::Overlap,
        }
    }

    /// Tint applied to covered surfaces
    pub fn tint(&self) -> Option<Vec3> {
        match self {
            CoverageClass::None => None,
            CoverageClass::Single => Some(Vec3::from(SINGLE_TINT)),
            CoverageClass::Overlap => Some(Vec3::from(OVERLAP_TINT)),
        }
    }
}

/// One camera slot with its depth map, if it has one
#[derive(Clone, Copy)]
pub struct ReferenceCamera<'a> {
    pub slot: CameraSlot,
    pub depth: Option<&'a dyn DepthSampler>,
}

pub fn in_camera_view(slot: &CameraSlot, p: Vec3) -> bool {
    let origin = slot.position.truncate();
    let direction = slot.direction.truncate().normalize();
    let (fov_y, aspect, near, far) = slot.frustum.into();
    let to_point = p - origin;
    let distance = to_point.dot(direction);
    if distance < near || distance > far {
        return false;
    }
    let half_height = distance * (fov_y.to_radians() * 0.5).tan();
    let half_width = half_height * aspect;
    let right = direction.cross(Vec3::Y).normalize();
    let up = right.cross(direction).normalize();
    let lateral = to_point - direction * distance;
    lateral.dot(right).abs() <= half_width && lateral.dot(up).abs() <= half_height
}

/// Texture coordinate and clip depth of `p` as seen by the slot's camera
pub fn project(slot: &CameraSlot, p: Vec3) -> (Vec2, f32) {
    let light_space = slot.shadow_matrix * p.extend(1.0);
    let ndc = light_space.truncate() / light_space.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, ndc.y * -0.5 + 0.5);
    (uv, ndc.z)
}

pub fn is_occluded(slot: &CameraSlot, p: Vec3, depth: &dyn DepthSampler) -> bool {
    let (uv, current) = project(slot, p);
    current - SHADOW_BIAS > depth.closest_depth(uv)
}

/// Whether `camera` counts toward coverage at `p` with surface `normal`
pub fn sees(camera: &ReferenceCamera, p: Vec3, normal: Vec3) -> bool {
    let to_camera = (camera.slot.position.truncate() - p).normalize();
    if normal.dot(to_camera) < 0.0 {
        return false;
    }
    if !in_camera_view(&camera.slot, p) {
        return false;
    }
    match camera.depth {
        Some(depth) if camera.slot.has_depth_target() => !is_occluded(&camera.slot, p, depth),
        _ => true,
    }
}

pub fn coverage_count(cameras: &[ReferenceCamera], p: Vec3, normal: Vec3) -> u32 {
    let normal = normal.normalize();
    cameras.iter().filter(|camera| sees(camera, p, normal)).count() as u32
}

pub fn classify(cameras: &[ReferenceCamera], p: Vec3, normal: Vec3) -> CoverageClass {
    CoverageClass::from_count(coverage_count(cameras, p, normal))
}

/// Final color of a front-facing fragment
pub fn shade(
    class: CoverageClass,
    lighting: &SceneLighting,
    p: Vec3,
    normal: Vec3,
    base_color: Vec3,
) -> Vec3 {
    let normal = normal.normalize();
    let ambient = lighting.ambient.color;
    let directional = normal
        .dot(lighting.directional.direction.normalize())
        .max(0.0)
        * lighting.directional.color;
    let hemisphere_factor = normal.dot((lighting.hemisphere.position - p).normalize());
    let hemisphere = lighting
        .hemisphere
        .ground_color
        .lerp(lighting.hemisphere.sky_color, hemisphere_factor);

    match class.tint() {
        Some(tint) => (ambient + directional + COVERED_HEMISPHERE_WEIGHT * hemisphere) * tint,
        None => (ambient + directional + hemisphere) * base_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{OpticalSettings, VirtualCamera};

    fn slot_looking_down_z() -> CameraSlot {
        let mut camera = VirtualCamera::new("cam", OpticalSettings::default()).unwrap();
        camera.place_at(Vec3::ZERO, Vec3::Z).unwrap();
        CameraSlot::from_camera(&camera, true)
    }

    #[test]
    fn test_far_plane_rejects_point() {
        let slot = slot_looking_down_z();
        assert!(in_camera_view(&slot, Vec3::new(0.0, 0.0, 100.0)));
        assert!(!in_camera_view(&slot, Vec3::new(0.0, 0.0, 4999.0)));
        assert!(!in_camera_view(&slot, Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn test_horizontal_extent_uses_aspect() {
        let slot = slot_looking_down_z();
        let half_height = 100.0 * (slot.frustum.x.to_radians() / 2.0).tan();
        let half_width = half_height * slot.frustum.y;
        assert!(in_camera_view(&slot, Vec3::new(half_width * 0.99, 0.0, 100.0)));
        assert!(!in_camera_view(&slot, Vec3::new(half_width * 1.01, 0.0, 100.0)));
        assert!(!in_camera_view(&slot, Vec3::new(0.0, half_height * 1.01, 100.0)));
    }

    #[test]
    fn test_projection_centers_optical_axis() {
        let slot = slot_looking_down_z();
        let (uv, depth) = project(&slot, Vec3::new(0.0, 0.0, 100.0));
        assert!((uv - Vec2::splat(0.5)).length() < 1e-4);
        assert!(depth > 0.0 && depth < 1.0);
    }

    #[test]
    fn test_occlusion_flips_with_stored_depth() {
        let slot = slot_looking_down_z();
        let p = Vec3::new(0.0, 0.0, 100.0);
        let (_, depth) = project(&slot, p);
        assert!(!is_occluded(&slot, p, &DepthImage::filled(4, depth)));
        assert!(is_occluded(&slot, p, &|_: Vec2| depth - 1e-3));
    }

    #[test]
    fn test_missing_depth_map_never_occludes() {
        let slot = slot_looking_down_z();
        let camera = ReferenceCamera { slot, depth: None };
        assert!(sees(&camera, Vec3::new(0.0, 0.0, 100.0), Vec3::NEG_Z));
    }

    #[test]
    fn test_shade_tints_covered_surfaces() {
        let lighting = SceneLighting::default();
        let p = Vec3::new(0.0, 0.0, 100.0);
        let single = shade(CoverageClass::Single, &lighting, p, Vec3::NEG_Z, Vec3::ONE);
        let overlap = shade(CoverageClass::Overlap, &lighting, p, Vec3::NEG_Z, Vec3::ONE);
        assert_eq!(single.z, 0.0);
        assert!(single.y > 0.0);
        assert_eq!(overlap.y, 0.0);
        assert_eq!(overlap.x, single.x);
    }
}
