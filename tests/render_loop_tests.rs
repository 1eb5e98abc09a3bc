//! Render loop integration tests on the dummy backend
//!
//! The dummy backend records every call, so these tests check the order and
//! content of what a frame asks the GPU to do.

mod common;

use cctv_planner::backend::dummy::RecordedCommand;
use cctv_planner::backend::{BufferHandle, DummyBackend};
use cctv_planner::coverage::AddOutcome;
use cctv_planner::editor::{CctvMode, ViewerEvent};
use cctv_planner::floorplan::ExtrudeOptions;
use cctv_planner::Viewer;
use common::{dummy_viewer, SAMPLE_PLAN};
use glam::Vec3;
use rstest::rstest;

fn pass_labels(viewer: &Viewer<DummyBackend>) -> Vec<String> {
    viewer
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::BeginRenderPass { label, .. } => label.clone(),
            _ => None,
        })
        .collect()
}

fn loaded_viewer(cameras: &[(&str, Vec3)]) -> Viewer<DummyBackend> {
    let mut viewer = dummy_viewer(4);
    viewer
        .load_floor_plan(SAMPLE_PLAN, &ExtrudeOptions::default())
        .unwrap();
    for (name, position) in cameras {
        viewer.create_camera(name, *position, Vec3::ZERO).unwrap();
    }
    viewer
}

#[rstest]
#[case::no_cameras(&[])]
#[case::one_camera(&[("a", Vec3::new(-300.0, 250.0, 0.0))])]
#[case::three_cameras(&[
    ("a", Vec3::new(-300.0, 250.0, 0.0)),
    ("b", Vec3::new(300.0, 250.0, 0.0)),
    ("c", Vec3::new(0.0, 250.0, 300.0)),
])]
fn test_depth_passes_precede_coverage_pass(#[case] cameras: &[(&str, Vec3)]) {
    let mut viewer = loaded_viewer(cameras);
    viewer.render().unwrap();

    let mut expected: Vec<String> = cameras
        .iter()
        .map(|(name, _)| format!("Depth Pass {}", name))
        .collect();
    expected.push("Coverage Pass".to_string());
    assert_eq!(pass_labels(&viewer), expected);
}

#[test]
fn test_each_depth_pass_uses_its_own_camera_buffer() {
    let mut viewer = loaded_viewer(&[
        ("a", Vec3::new(-300.0, 250.0, 0.0)),
        ("b", Vec3::new(300.0, 250.0, 0.0)),
    ]);
    viewer.render().unwrap();

    let commands = viewer.backend().commands();
    let camera_size = std::mem::size_of::<cctv_planner::scene::CameraUniformData>();
    let writes: Vec<BufferHandle> = commands
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::WriteBuffer { buffer, len, .. } if *len == camera_size => {
                Some(*buffer)
            }
            _ => None,
        })
        .collect();
    // Two depth cameras and the viewer camera
    assert_eq!(writes.len(), 3);
    assert_ne!(writes[0], writes[1]);
    assert_ne!(writes[1], writes[2]);
}

#[test]
fn test_frame_writes_active_count() {
    let mut viewer = loaded_viewer(&[
        ("a", Vec3::new(-300.0, 250.0, 0.0)),
        ("b", Vec3::new(300.0, 250.0, 0.0)),
    ]);
    viewer.render().unwrap();

    let uniforms = viewer.coverage().uniforms();
    let buffer = uniforms.buffer().unwrap();
    let bytes = viewer.backend().buffer_contents(buffer).unwrap();
    let offset = uniforms.layout().cctv_count.offset as usize;
    let count: u32 = bytemuck::pod_read_unaligned(&bytes[offset..offset + 4]);
    assert_eq!(count, 2);
}

#[test]
fn test_removed_camera_is_not_rendered() {
    let mut viewer = loaded_viewer(&[
        ("a", Vec3::new(-300.0, 250.0, 0.0)),
        ("b", Vec3::new(300.0, 250.0, 0.0)),
    ]);
    viewer.render().unwrap();
    viewer.remove_camera("a").unwrap();
    assert!(viewer.coverage().depth_target("a").is_none());

    let before = viewer.backend().commands().len();
    viewer.render().unwrap();
    let labels: Vec<_> = viewer.backend().commands()[before..]
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::BeginRenderPass { label, .. } => label.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["Depth Pass b", "Coverage Pass"]);
}

#[test]
fn test_capacity_change_between_frames() {
    let mut viewer = loaded_viewer(&[("a", Vec3::new(-300.0, 250.0, 0.0))]);
    viewer.render().unwrap();
    viewer.set_camera_capacity(6).unwrap();
    viewer.render().unwrap();

    assert_eq!(viewer.coverage().capacity(), 6);
    assert_eq!(viewer.config().camera_capacity, 6);
    assert!(viewer.set_camera_capacity(0).is_err());
}

#[test]
fn test_exhausted_texture_memory_keeps_camera_without_occlusion() {
    let mut viewer = Viewer::from_backend(
        // Room for the scratch attachment only
        DummyBackend::new().with_texture_budget(1),
        cctv_planner::PlannerConfig {
            depth_resolution: common::TEST_DEPTH_RESOLUTION,
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = viewer
        .create_camera("a", Vec3::new(-300.0, 250.0, 0.0), Vec3::ZERO)
        .unwrap();
    assert!(matches!(outcome, AddOutcome::WithoutDepthTarget { slot: 0, .. }));
    assert!(viewer.coverage().allocation_blocked());
    assert!(viewer.coverage().camera("a").is_some());
}

#[test]
fn test_editor_events_follow_edits() {
    let mut viewer = loaded_viewer(&[]);
    assert!(viewer.set_mode(CctvMode::Add, None));
    viewer
        .create_camera("a", Vec3::new(-300.0, 250.0, 0.0), Vec3::ZERO)
        .unwrap();
    assert!(viewer.set_mode(CctvMode::LookAt, Some("a")));
    viewer.aim_camera("a", Vec3::new(100.0, 0.0, 0.0)).unwrap();

    assert_eq!(viewer.editor().selected_camera(), Some("a"));
    assert_eq!(
        viewer.drain_events(),
        vec![
            ViewerEvent::ModelReady,
            ViewerEvent::ModeChanged(CctvMode::Add),
            ViewerEvent::CameraChanged("a".into()),
            ViewerEvent::ModeChanged(CctvMode::LookAt),
            ViewerEvent::CameraChanged("a".into()),
        ]
    );
}
