//! Shared fixtures for the integration tests

#![allow(dead_code)]

use cctv_planner::backend::DummyBackend;
use cctv_planner::coverage::{CoverageSystem, DepthTargetConfig};
use cctv_planner::scene::{OpticalSettings, VirtualCamera};
use cctv_planner::{PlannerConfig, Viewer};
use glam::Vec3;

/// Depth targets small enough to keep the dummy backend cheap
pub const TEST_DEPTH_RESOLUTION: u32 = 64;

/// An L-shaped corridor with one storage box
pub const SAMPLE_PLAN: &str = r#"{"paths": [
    {"points": [[0, 0], [800, 0], [800, 600]]},
    {"kind": "box", "points": [[300, 200], [400, 200], [400, 300], [300, 300]], "size": 1}
]}"#;

pub fn camera_at(name: &str, position: Vec3, target: Vec3) -> VirtualCamera {
    let mut camera = VirtualCamera::new(name, OpticalSettings::default())
        .expect("default optics are valid");
    camera
        .place_at(position, target)
        .expect("position and target differ");
    camera
}

pub fn coverage_system(capacity: u32) -> CoverageSystem {
    CoverageSystem::new(
        capacity,
        DepthTargetConfig {
            resolution: TEST_DEPTH_RESOLUTION,
            ..Default::default()
        },
    )
    .expect("capacity is in range")
}

pub fn dummy_viewer(capacity: u32) -> Viewer<DummyBackend> {
    Viewer::from_backend(
        DummyBackend::new(),
        PlannerConfig {
            camera_capacity: capacity,
            depth_resolution: TEST_DEPTH_RESOLUTION,
            ..Default::default()
        },
    )
    .expect("dummy viewer")
}
