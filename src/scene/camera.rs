//! Camera abstraction shared by the viewer camera and CCTV cameras

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};

/// Anything that projects the scene through a perspective frustum.
///
/// The coverage passes only need this view of a camera, so the viewer camera
/// and CCTV cameras are interchangeable wherever a projection is consumed.
pub trait ProjectingCamera {
    fn position(&self) -> Vec3;

    fn orientation(&self) -> Quat;

    /// Vertical field of view in degrees
    fn fov_y_degrees(&self) -> f32;

    fn aspect(&self) -> f32;

    fn near(&self) -> f32;

    fn far(&self) -> f32;

    /// World-space direction of the optical axis (local -Z)
    fn view_direction(&self) -> Vec3 {
        self.orientation() * -Vec3::Z
    }

    fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation(), self.position()).inverse()
    }

    fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees().to_radians(),
            self.aspect(),
            self.near(),
            self.far(),
        )
    }

    fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Camera the user views the scene through
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1500.0, 1500.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 75.0,
            aspect: 16.0 / 9.0,
            near: 1.0,
            far: 100000.0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Update aspect ratio from the surface size
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }
}

impl ProjectingCamera for Camera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn orientation(&self) -> Quat {
        let (_, rotation, _) = self.view_matrix().inverse().to_scale_rotation_translation();
        rotation
    }

    fn fov_y_degrees(&self) -> f32 {
        self.fov_y_degrees
    }

    fn aspect(&self) -> f32 {
        self.aspect
    }

    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }

    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub position: Vec4,
}

impl CameraUniformData {
    /// Build camera uniform data for shaders
    pub fn from_camera(camera: &impl ProjectingCamera) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        Self {
            view,
            proj,
            view_proj: proj * view,
            position: camera.position().extend(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_camera_direction_matches_target() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        assert!((camera.view_direction() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_uniform_data_combines_view_and_projection() {
        let camera = Camera::new(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO);
        let data = CameraUniformData::from_camera(&camera);
        let expected = camera.projection_matrix() * camera.view_matrix();
        assert!(data.view_proj.abs_diff_eq(expected, 1e-5));
        assert_eq!(data.position, Vec4::new(3.0, 4.0, 5.0, 1.0));
    }
}
