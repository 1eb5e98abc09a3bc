//! Persisted camera placements
//!
//! A camera map is a JSON array of `[name, {"matrix": [..16], "focalLength"?}]`
//! pairs. Matrices are column-major world transforms. Everything not stored
//! per camera comes from a shared optical profile.

use super::cctv::{CameraError, OpticalSettings, VirtualCamera};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraMapError {
    #[error("camera map is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("camera '{name}' is invalid: {source}")]
    Camera {
        name: String,
        #[source]
        source: CameraError,
    },
    #[error("camera name '{0}' appears more than once")]
    DuplicateName(String),
}

/// Stored placement of one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPlacement {
    pub matrix: [f32; 16],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f32>,
}

impl CameraPlacement {
    pub fn from_camera(camera: &VirtualCamera) -> Self {
        Self {
            matrix: camera.transform().matrix().to_cols_array(),
            focal_length: Some(camera.focal_length()),
        }
    }
}

/// Ordered name → placement list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraMap {
    entries: Vec<(String, CameraPlacement)>,
}

impl CameraMap {
    pub fn from_json(json: &str) -> Result<Self, CameraMapError> {
        let map: Self = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        for (name, _) in &map.entries {
            if !seen.insert(name.as_str()) {
                return Err(CameraMapError::DuplicateName(name.clone()));
            }
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String, CameraMapError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Capture the current placement of each camera, in order
    pub fn from_cameras<'a>(cameras: impl IntoIterator<Item = &'a VirtualCamera>) -> Self {
        Self {
            entries: cameras
                .into_iter()
                .map(|camera| (camera.name().to_string(), CameraPlacement::from_camera(camera)))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[(String, CameraPlacement)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build cameras from `profile`, overriding focal length per entry
    pub fn instantiate(&self, profile: &OpticalSettings) -> Result<Vec<VirtualCamera>, CameraMapError> {
        self.entries
            .iter()
            .map(|(name, placement)| {
                let wrap = |source| CameraMapError::Camera {
                    name: name.clone(),
                    source,
                };
                let optics = OpticalSettings {
                    focal_length: placement.focal_length.unwrap_or(profile.focal_length),
                    ..*profile
                };
                let mut camera = VirtualCamera::new(name.clone(), optics).map_err(wrap)?;
                camera
                    .place_by_transform(Mat4::from_cols_array(&placement.matrix))
                    .map_err(wrap)?;
                Ok(camera)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ProjectingCamera;
    use glam::Vec3;

    const MAP: &str = r#"[
        ["lobby", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 100,250,-40,1], "focalLength": 2.8}],
        ["dock", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,300,0,1]}]
    ]"#;

    #[test]
    fn test_instantiate_applies_profile_and_overrides() {
        let map = CameraMap::from_json(MAP).unwrap();
        let cameras = map.instantiate(&OpticalSettings::default()).unwrap();

        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].name(), "lobby");
        assert_eq!(cameras[0].focal_length(), 2.8);
        assert_eq!(cameras[0].position(), Vec3::new(100.0, 250.0, -40.0));
        assert_eq!(cameras[1].focal_length(), 4.0);
        assert_eq!(cameras[1].sensor_width(), 4.8);
    }

    #[test]
    fn test_round_trip_through_cameras() {
        let map = CameraMap::from_json(MAP).unwrap();
        let cameras = map.instantiate(&OpticalSettings::default()).unwrap();
        let json = CameraMap::from_cameras(&cameras).to_json().unwrap();
        let reparsed = CameraMap::from_json(&json).unwrap();
        assert_eq!(reparsed.entries()[0].0, "lobby");
        assert_eq!(reparsed.entries()[1].1.focal_length, Some(4.0));
    }

    #[test]
    fn test_invalid_entry_names_the_camera() {
        let json = r#"[["bad", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1], "focalLength": 0}]]"#;
        let map = CameraMap::from_json(json).unwrap();
        match map.instantiate(&OpticalSettings::default()) {
            Err(CameraMapError::Camera { name, source }) => {
                assert_eq!(name, "bad");
                assert_eq!(source, CameraError::InvalidFocalLength(0.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let json = r#"[["a", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]}],
                       ["a", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]}]]"#;
        assert!(matches!(
            CameraMap::from_json(json),
            Err(CameraMapError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            CameraMap::from_json("{\"not\": \"an array\"}"),
            Err(CameraMapError::Parse(_))
        ));
    }
}
