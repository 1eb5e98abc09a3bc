//! Scene lighting used by the coverage shading

use glam::{Vec3, Vec4};

/// Convert a `0xRRGGBB` color to float RGB in [0, 1]
pub fn color_from_hex(hex: u32) -> Vec3 {
    Vec3::new(
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    )
}

/// Uniform light from every direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
}

/// Light arriving along a single direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Points from the surface toward the light
    pub direction: Vec3,
    pub color: Vec3,
}

/// Sky/ground gradient keyed on the direction toward `position`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    pub sky_color: Vec3,
    pub ground_color: Vec3,
    pub position: Vec3,
}

/// The three lights the coverage program shades with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLighting {
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    pub hemisphere: HemisphereLight,
}

impl Default for SceneLighting {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: color_from_hex(0xffffff),
            },
            directional: DirectionalLight {
                direction: Vec3::Z,
                color: color_from_hex(0xffffff),
            },
            hemisphere: HemisphereLight {
                sky_color: color_from_hex(0xffffbb),
                ground_color: color_from_hex(0x080820),
                position: Vec3::new(0.0, 500.0, 0.0),
            },
        }
    }
}

impl SceneLighting {
    /// Values in the order the coverage uniform block declares them:
    /// ambient, directional color, directional direction, sky, ground,
    /// hemisphere position
    pub fn uniform_values(&self) -> [Vec4; 6] {
        [
            self.ambient.color.extend(1.0),
            self.directional.color.extend(1.0),
            self.directional.direction.normalize_or_zero().extend(0.0),
            self.hemisphere.sky_color.extend(1.0),
            self.hemisphere.ground_color.extend(1.0),
            self.hemisphere.position.extend(1.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(color_from_hex(0xff0000), Vec3::X);
        let sky = color_from_hex(0xffffbb);
        assert!((sky.z - 187.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_default_direction_is_normalized() {
        let values = SceneLighting::default().uniform_values();
        assert!((values[2].truncate().length() - 1.0).abs() < 1e-6);
    }
}
