//! Rigid transforms for cameras and scene objects

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

/// Position, rotation and scale of an object in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Decompose an affine matrix into translation, rotation and scale
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get the normal matrix (inverse transpose of model matrix)
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }

    /// Get forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get up direction (local +Y in world space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Rotate so local -Z points at `target`.
    ///
    /// When the view line is parallel to `up`, world +Z stands in for it.
    /// Returns false and leaves the rotation untouched if `target` is the
    /// current position.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) -> bool {
        let Some(forward) = (target - self.position).try_normalize() else {
            return false;
        };
        let right = forward
            .cross(up)
            .try_normalize()
            .or_else(|| forward.cross(Vec3::Z).try_normalize())
            .unwrap_or(Vec3::X);
        let up = right.cross(forward);

        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize();
        true
    }

    /// Build uniform data for shaders
    pub fn uniform_data(&self, base_color: Vec3) -> ObjectUniformData {
        let model = self.matrix();
        ObjectUniformData {
            model,
            normal_matrix: model.inverse().transpose(),
            base_color: base_color.extend(1.0),
        }
    }
}

/// Per-object uniform data shared by the depth and coverage passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniformData {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    pub base_color: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_points_forward_at_target() {
        let mut transform = Transform::from_position(Vec3::new(0.0, 10.0, 0.0));
        assert!(transform.look_at(Vec3::new(10.0, 10.0, 0.0), Vec3::Y));
        assert!((transform.forward() - Vec3::X).length() < 1e-5);
        assert!((transform.up() - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_look_at_straight_down_stays_finite() {
        let mut transform = Transform::from_position(Vec3::new(0.0, 10.0, 0.0));
        assert!(transform.look_at(Vec3::ZERO, Vec3::Y));
        assert!((transform.forward() - Vec3::NEG_Y).length() < 1e-5);
        assert!(transform.rotation.is_finite());
    }

    #[test]
    fn test_look_at_own_position_is_rejected() {
        let mut transform = Transform::from_position(Vec3::ONE);
        assert!(!transform.look_at(Vec3::ONE, Vec3::Y));
        assert_eq!(transform.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_from_matrix_round_trips() {
        let original = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.7),
            scale: Vec3::ONE,
        };
        let decomposed = Transform::from_matrix(original.matrix());
        assert!((decomposed.position - original.position).length() < 1e-5);
        assert!(decomposed.rotation.angle_between(original.rotation) < 1e-4);
    }
}
