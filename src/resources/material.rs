//! Surface materials for uncovered geometry

use crate::scene::color_from_hex;
use glam::Vec3;

/// Flat material; covered surfaces ignore `base_color` and take the
/// coverage tint instead
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub base_color: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec3::ONE,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec3) -> Self {
        self.base_color = color;
        self
    }

    // Preset materials

    pub fn wall() -> Self {
        Self::new("wall").with_base_color(color_from_hex(0xaaaaaa))
    }

    pub fn storage_box() -> Self {
        Self::new("box").with_base_color(color_from_hex(0x448844))
    }

    pub fn floor() -> Self {
        Self::new("floor").with_base_color(color_from_hex(0xcccccc))
    }
}
