//! Virtual CCTV cameras driven by real lens and sensor parameters
//!
//! Field of view and aspect ratio are never set directly. They are derived
//! from focal length and sensor size on every optics change, so a camera's
//! projection always matches the physical unit it models.

use super::camera::ProjectingCamera;
use super::transform::Transform;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest deviation from unit scale accepted when placing by matrix
pub const SCALE_TOLERANCE: f32 = 1e-3;

/// Rejected camera configuration. Values are never clamped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("focal length must be positive and finite, got {0}")]
    InvalidFocalLength(f32),
    #[error("sensor width must be positive and finite, got {0}")]
    InvalidSensorWidth(f32),
    #[error("sensor height must be positive and finite, got {0}")]
    InvalidSensorHeight(f32),
    #[error("near plane must be positive and finite, got {0}")]
    InvalidNear(f32),
    #[error("far plane {far} must be finite and greater than near plane {near}")]
    InvalidClipRange { near: f32, far: f32 },
    #[error("look-at target coincides with the camera position")]
    DegenerateLookAt,
    #[error("camera transform must not scale, got scale {0}")]
    NonUnitScale(Vec3),
    #[error("camera transform contains non-finite values")]
    NonFiniteTransform,
}

/// Lens, sensor and clip-plane parameters of a camera, in millimetres for the
/// optics and scene units for the clip planes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpticalSettings {
    pub focal_length: f32,
    pub sensor_width: f32,
    pub sensor_height: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OpticalSettings {
    /// A 4 mm lens on a 1/3" sensor
    fn default() -> Self {
        Self {
            focal_length: 4.0,
            sensor_width: 4.8,
            sensor_height: 3.6,
            near: 5.0,
            far: 3000.0,
        }
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl OpticalSettings {
    pub fn validate(&self) -> Result<(), CameraError> {
        if !positive(self.focal_length) {
            return Err(CameraError::InvalidFocalLength(self.focal_length));
        }
        if !positive(self.sensor_width) {
            return Err(CameraError::InvalidSensorWidth(self.sensor_width));
        }
        if !positive(self.sensor_height) {
            return Err(CameraError::InvalidSensorHeight(self.sensor_height));
        }
        if !positive(self.near) {
            return Err(CameraError::InvalidNear(self.near));
        }
        if !self.far.is_finite() || self.far <= self.near {
            return Err(CameraError::InvalidClipRange {
                near: self.near,
                far: self.far,
            });
        }
        Ok(())
    }

    /// `2·atan(sensor_height / (2·focal_length))`, in degrees
    pub fn fov_y_degrees(&self) -> f32 {
        (2.0 * (self.sensor_height / (2.0 * self.focal_length)).atan()).to_degrees()
    }

    pub fn aspect(&self) -> f32 {
        self.sensor_width / self.sensor_height
    }
}

/// One simulated surveillance camera
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualCamera {
    name: String,
    transform: Transform,
    optics: OpticalSettings,
    fov_y_degrees: f32,
    aspect: f32,
    projection: Mat4,
}

impl VirtualCamera {
    pub fn new(name: impl Into<String>, optics: OpticalSettings) -> Result<Self, CameraError> {
        optics.validate()?;
        let mut camera = Self {
            name: name.into(),
            transform: Transform::default(),
            optics,
            fov_y_degrees: 0.0,
            aspect: 1.0,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection();
        Ok(camera)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn optics(&self) -> &OpticalSettings {
        &self.optics
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn focal_length(&self) -> f32 {
        self.optics.focal_length
    }

    pub fn sensor_width(&self) -> f32 {
        self.optics.sensor_width
    }

    pub fn sensor_height(&self) -> f32 {
        self.optics.sensor_height
    }

    pub fn set_focal_length(&mut self, focal_length: f32) -> Result<(), CameraError> {
        self.reconfigure(OpticalSettings {
            focal_length,
            ..self.optics
        })
    }

    pub fn set_sensor_width(&mut self, sensor_width: f32) -> Result<(), CameraError> {
        self.reconfigure(OpticalSettings {
            sensor_width,
            ..self.optics
        })
    }

    pub fn set_sensor_height(&mut self, sensor_height: f32) -> Result<(), CameraError> {
        self.reconfigure(OpticalSettings {
            sensor_height,
            ..self.optics
        })
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) -> Result<(), CameraError> {
        self.reconfigure(OpticalSettings {
            near,
            far,
            ..self.optics
        })
    }

    /// Replace all optical parameters at once. On error nothing changes.
    pub fn reconfigure(&mut self, optics: OpticalSettings) -> Result<(), CameraError> {
        optics.validate()?;
        self.optics = optics;
        self.update_projection();
        Ok(())
    }

    fn update_projection(&mut self) {
        self.fov_y_degrees = self.optics.fov_y_degrees();
        self.aspect = self.optics.aspect();
        self.projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.optics.near,
            self.optics.far,
        );
    }

    /// Move to `position` and aim the optical axis at `target`, world +Y up
    pub fn place_at(&mut self, position: Vec3, target: Vec3) -> Result<(), CameraError> {
        if !position.is_finite() || !target.is_finite() {
            return Err(CameraError::NonFiniteTransform);
        }
        let mut transform = Transform::from_position(position);
        if !transform.look_at(target, Vec3::Y) {
            return Err(CameraError::DegenerateLookAt);
        }
        self.transform = transform;
        Ok(())
    }

    /// Adopt a rigid world matrix. Scaled matrices are rejected since they
    /// would distort the frustum.
    pub fn place_by_transform(&mut self, matrix: Mat4) -> Result<(), CameraError> {
        if !matrix.is_finite() {
            return Err(CameraError::NonFiniteTransform);
        }
        let transform = Transform::from_matrix(matrix);
        if !transform.scale.abs_diff_eq(Vec3::ONE, SCALE_TOLERANCE) {
            return Err(CameraError::NonUnitScale(transform.scale));
        }
        self.transform = Transform {
            scale: Vec3::ONE,
            rotation: transform.rotation.normalize(),
            ..transform
        };
        Ok(())
    }
}

impl ProjectingCamera for VirtualCamera {
    fn position(&self) -> Vec3 {
        self.transform.position
    }

    fn orientation(&self) -> Quat {
        self.transform.rotation
    }

    fn fov_y_degrees(&self) -> f32 {
        self.fov_y_degrees
    }

    fn aspect(&self) -> f32 {
        self.aspect
    }

    fn near(&self) -> f32 {
        self.optics.near
    }

    fn far(&self) -> f32 {
        self.optics.far
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }
}
