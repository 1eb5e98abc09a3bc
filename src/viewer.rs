//! Viewer orchestrator
//!
//! Binds the backend, scene, coverage system, renderer and editor state into
//! the single object a host drives: load inputs, edit cameras, render frames
//! and drain events.

use crate::backend::traits::*;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::coverage::{AddOutcome, CoverageError, CoverageSystem, DepthTargetConfig};
use crate::editor::{CctvMode, Editor, ViewerEvent};
use crate::floorplan::{ExtrudeOptions, FloorPlan, FloorPlanError};
use crate::pipeline::CoverageRenderer;
use crate::scene::{
    CameraError, CameraMap, CameraMapError, OpticalSettings, ProjectingCamera, Scene, VirtualCamera,
};
use crate::PlannerConfig;
use glam::{Mat4, Vec3};
use std::sync::Arc;
use thiserror::Error;
use winit::window::Window as WinitWindow;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    CameraMap(#[from] CameraMapError),
    #[error(transparent)]
    FloorPlan(#[from] FloorPlanError),
}

pub type ViewerResult<T> = Result<T, ViewerError>;

/// Everything needed to plan camera coverage over one floor plan
pub struct Viewer<B: GraphicsBackend = WgpuBackend> {
    config: PlannerConfig,
    backend: B,
    scene: Scene,
    coverage: CoverageSystem,
    renderer: CoverageRenderer,
    editor: Editor,
    width: u32,
    height: u32,
}

impl Viewer<WgpuBackend> {
    /// Create a viewer for `window` (native only - use new_async on web)
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(window: Arc<WinitWindow>, config: PlannerConfig) -> ViewerResult<Self> {
        let backend = WgpuBackend::new(window, config.vsync)?;
        Self::from_backend(backend, config)
    }

    /// Create a viewer asynchronously (required on web)
    pub async fn new_async(window: Arc<WinitWindow>, config: PlannerConfig) -> ViewerResult<Self> {
        let backend = WgpuBackend::new_async(window, config.vsync).await?;
        Self::from_backend(backend, config)
    }
}

impl<B: GraphicsBackend> Viewer<B> {
    /// Create a viewer on an initialized backend
    pub fn from_backend(mut backend: B, config: PlannerConfig) -> ViewerResult<Self> {
        let coverage = CoverageSystem::new(
            config.camera_capacity,
            DepthTargetConfig {
                resolution: config.depth_resolution,
                ..Default::default()
            },
        )?;
        let renderer = CoverageRenderer::new(&mut backend, config.clear_color)?;

        let (width, height) = backend.surface_size();
        let mut scene = Scene::new();
        scene.camera.set_aspect(width as f32, height as f32);

        log::info!(
            "Viewer ready: {}x{}, {} camera slots, {}px depth targets",
            width,
            height,
            config.camera_capacity,
            config.depth_resolution
        );

        Ok(Self {
            config,
            backend,
            scene,
            coverage,
            renderer,
            editor: Editor::new(),
            width,
            height,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn coverage(&self) -> &CoverageSystem {
        &self.coverage
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Replace the scene geometry with an extruded floor plan and frame it
    pub fn load_floor_plan(&mut self, json: &str, options: &ExtrudeOptions) -> ViewerResult<()> {
        let geometry = FloorPlan::from_json(json)?.build_meshes(options)?;
        self.scene.clear();
        geometry.add_to_scene(&mut self.scene);
        self.frame_scene();
        log::info!("Loaded floor plan with {} objects", self.scene.objects().len());
        self.editor.model_ready();
        Ok(())
    }

    /// Point the viewer camera at the middle of the scene from above
    pub fn frame_scene(&mut self) {
        let Some((min, max)) = self.scene.bounds() else {
            return;
        };
        let center = (min + max) * 0.5;
        let extent = (max - min).max_element().max(1.0);
        self.scene.camera.look_at(center);
        self.scene
            .camera
            .set_position(center + Vec3::new(0.0, extent, extent));
    }

    /// Activate every camera of a saved map and return the outcome for each
    /// newly activated one. Cameras already active under the same name are
    /// updated in place, keeping their slot and depth target.
    ///
    /// The map is applied entirely or not at all.
    pub fn load_camera_map(&mut self, json: &str) -> ViewerResult<Vec<AddOutcome>> {
        let cameras = CameraMap::from_json(json)?.instantiate(&self.config.optics)?;
        let (replaced, added): (Vec<_>, Vec<_>) = cameras
            .into_iter()
            .partition(|camera| self.coverage.camera(camera.name()).is_some());

        let capacity = self.coverage.capacity();
        let free = capacity as usize - self.coverage.cameras().len();
        if added.len() > free {
            return Err(CoverageError::CapacityExceeded { capacity }.into());
        }

        let mut activated = Vec::with_capacity(added.len());
        let mut outcomes = Vec::with_capacity(added.len());
        for camera in added {
            let name = camera.name().to_string();
            match self.coverage.add_camera(&mut self.backend, camera) {
                Ok(outcome) => {
                    activated.push(name);
                    outcomes.push(outcome);
                }
                Err(error) => {
                    log::warn!("Camera map rejected at '{}': {}", name, error);
                    for name in &activated {
                        self.coverage.remove_camera(&mut self.backend, name)?;
                    }
                    return Err(error.into());
                }
            }
        }

        for camera in replaced {
            let name = camera.name().to_string();
            if let Some(active) = self.coverage.camera_mut(&name) {
                *active = camera;
            }
            self.editor.camera_changed(&name);
        }
        for name in &activated {
            self.editor.camera_changed(name);
        }
        Ok(outcomes)
    }

    /// Snapshot of the active cameras in the camera-map format
    pub fn export_camera_map(&self) -> CameraMap {
        CameraMap::from_cameras(self.coverage.cameras().iter())
    }

    pub fn add_camera(&mut self, camera: VirtualCamera) -> ViewerResult<AddOutcome> {
        let name = camera.name().to_string();
        let outcome = self.coverage.add_camera(&mut self.backend, camera)?;
        self.editor.camera_changed(&name);
        Ok(outcome)
    }

    /// Create a camera with the configured optics at `position`, looking at
    /// `target`
    pub fn create_camera(
        &mut self,
        name: &str,
        position: Vec3,
        target: Vec3,
    ) -> ViewerResult<AddOutcome> {
        let mut camera = VirtualCamera::new(name, self.config.optics)?;
        camera.place_at(position, target)?;
        self.add_camera(camera)
    }

    pub fn remove_camera(&mut self, name: &str) -> ViewerResult<VirtualCamera> {
        let camera = self.coverage.remove_camera(&mut self.backend, name)?;
        self.editor.camera_removed(name);
        Ok(camera)
    }

    fn edit_camera(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut VirtualCamera) -> Result<(), CameraError>,
    ) -> ViewerResult<()> {
        let camera = self
            .coverage
            .camera_mut(name)
            .ok_or_else(|| CoverageError::UnknownCamera(name.to_string()))?;
        edit(camera)?;
        self.editor.camera_changed(name);
        Ok(())
    }

    pub fn place_camera(&mut self, name: &str, position: Vec3, target: Vec3) -> ViewerResult<()> {
        self.edit_camera(name, |camera| camera.place_at(position, target))
    }

    pub fn place_camera_by_transform(&mut self, name: &str, matrix: Mat4) -> ViewerResult<()> {
        self.edit_camera(name, |camera| camera.place_by_transform(matrix))
    }

    /// Move a camera, keeping its viewing direction
    pub fn move_camera(&mut self, name: &str, position: Vec3) -> ViewerResult<()> {
        self.edit_camera(name, |camera| {
            let target = position + camera.view_direction();
            camera.place_at(position, target)
        })
    }

    /// Aim a camera at `target` from where it stands
    pub fn aim_camera(&mut self, name: &str, target: Vec3) -> ViewerResult<()> {
        self.edit_camera(name, |camera| {
            let position = camera.position();
            camera.place_at(position, target)
        })
    }

    pub fn reconfigure_camera(&mut self, name: &str, optics: OpticalSettings) -> ViewerResult<()> {
        self.edit_camera(name, |camera| camera.reconfigure(optics))
    }

    pub fn set_camera_capacity(&mut self, capacity: u32) -> ViewerResult<()> {
        self.coverage.set_camera_capacity(&mut self.backend, capacity)?;
        self.config.camera_capacity = capacity;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: CctvMode, selection: Option<&str>) -> bool {
        self.editor.set_mode(mode, selection)
    }

    pub fn select_camera(&mut self, name: Option<&str>) {
        self.editor.select(name);
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.editor.drain_events().collect()
    }

    /// Handle window resize
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.backend.resize(width, height);

        // May be clamped by device limits like WebGL2's 2048 max
        let (actual_width, actual_height) = self.backend.surface_size();
        if (actual_width, actual_height) == (self.width, self.height) {
            return;
        }
        self.width = actual_width;
        self.height = actual_height;
        self.scene
            .camera
            .set_aspect(actual_width as f32, actual_height as f32);
    }

    /// Render and present one frame
    pub fn render(&mut self) -> ViewerResult<()> {
        let frame = self.backend.begin_frame()?;
        self.renderer
            .render(&mut self.backend, &self.scene, &mut self.coverage, &frame)?;
        self.backend.end_frame()?;
        Ok(())
    }

    /// Free every GPU resource the viewer created
    pub fn shutdown(&mut self) {
        self.renderer.release(&mut self.backend);
        self.coverage.release(&mut self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::RecordedCommand;
    use crate::backend::DummyBackend;

    const PLAN: &str = r#"{"paths": [
        {"points": [[0, 0], [400, 0], [400, 300]]},
        {"kind": "box", "points": [[100, 100], [150, 100], [150, 150], [100, 150]], "size": 1}
    ]}"#;

    fn viewer() -> Viewer<DummyBackend> {
        Viewer::from_backend(
            DummyBackend::new(),
            PlannerConfig {
                camera_capacity: 4,
                depth_resolution: 256,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_floor_plan_load_announces_model() {
        let mut viewer = viewer();
        viewer.load_floor_plan(PLAN, &ExtrudeOptions::default()).unwrap();
        assert!(!viewer.scene().objects().is_empty());
        assert_eq!(viewer.drain_events(), vec![ViewerEvent::ModelReady]);
    }

    #[test]
    fn test_camera_edits_emit_events() {
        let mut viewer = viewer();
        viewer
            .create_camera("cam", Vec3::new(0.0, 250.0, 0.0), Vec3::new(200.0, 0.0, 200.0))
            .unwrap();
        viewer.aim_camera("cam", Vec3::new(-200.0, 0.0, 0.0)).unwrap();
        viewer.remove_camera("cam").unwrap();

        assert_eq!(
            viewer.drain_events(),
            vec![
                ViewerEvent::CameraChanged("cam".into()),
                ViewerEvent::CameraChanged("cam".into()),
                ViewerEvent::CameraRemoved("cam".into()),
            ]
        );
        assert!(matches!(
            viewer.aim_camera("cam", Vec3::ZERO),
            Err(ViewerError::Coverage(CoverageError::UnknownCamera(_)))
        ));
    }

    #[test]
    fn test_rejected_edit_leaves_camera_unchanged() {
        let mut viewer = viewer();
        let position = Vec3::new(0.0, 250.0, 0.0);
        viewer
            .create_camera("cam", position, Vec3::new(100.0, 0.0, 0.0))
            .unwrap();
        viewer.drain_events();
        let before = viewer.coverage().camera("cam").unwrap().clone();

        assert!(viewer.aim_camera("cam", position).is_err());
        let camera = viewer.coverage().camera("cam").unwrap();
        assert_eq!(camera, &before);
        assert!((camera.view_direction() - Vec3::new(100.0, -250.0, 0.0).normalize()).length() < 1e-4);
        assert!(viewer.drain_events().is_empty());
    }

    #[test]
    fn test_camera_map_round_trips_through_viewer() {
        let mut viewer = viewer();
        viewer
            .create_camera("a", Vec3::new(0.0, 250.0, 0.0), Vec3::new(100.0, 0.0, 0.0))
            .unwrap();
        viewer
            .create_camera("b", Vec3::new(300.0, 250.0, 0.0), Vec3::ZERO)
            .unwrap();
        let json = viewer.export_camera_map().to_json().unwrap();

        let mut other = self::viewer();
        let outcomes = other.load_camera_map(&json).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(other.coverage().cameras().position("b"), Some(1));
    }

    const THREE_CAMERAS: &str = r#"[
        ["a", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,250,0,1]}],
        ["b", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 300,250,0,1]}],
        ["c", {"matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, -300,250,0,1]}]
    ]"#;

    #[test]
    fn test_camera_map_over_capacity_changes_nothing() {
        let mut viewer = viewer();
        viewer.set_camera_capacity(2).unwrap();
        viewer
            .create_camera("a", Vec3::new(0.0, 100.0, 100.0), Vec3::ZERO)
            .unwrap();
        viewer.drain_events();
        let before = viewer.coverage().camera("a").unwrap().clone();

        assert!(matches!(
            viewer.load_camera_map(THREE_CAMERAS),
            Err(ViewerError::Coverage(CoverageError::CapacityExceeded { capacity: 2 }))
        ));
        assert_eq!(viewer.coverage().cameras().len(), 1);
        assert_eq!(viewer.coverage().camera("a"), Some(&before));
        assert!(viewer.coverage().depth_target("a").is_some());
        assert!(viewer.drain_events().is_empty());
    }

    #[test]
    fn test_camera_map_rolls_back_when_allocation_blocks() {
        // Scratch attachment plus one depth target
        let mut viewer = Viewer::from_backend(
            DummyBackend::new().with_texture_budget(2),
            PlannerConfig {
                camera_capacity: 4,
                depth_resolution: 256,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(
            viewer.load_camera_map(THREE_CAMERAS),
            Err(ViewerError::Coverage(CoverageError::AllocationBlocked))
        ));
        assert!(viewer.coverage().cameras().is_empty());
        assert!(viewer.coverage().depth_target("a").is_none());
        assert!(!viewer.coverage().allocation_blocked());
        assert!(viewer.drain_events().is_empty());
    }

    #[test]
    fn test_camera_map_updates_active_camera_in_place() {
        let mut viewer = viewer();
        viewer
            .create_camera("b", Vec3::new(0.0, 100.0, 100.0), Vec3::ZERO)
            .unwrap();
        let target = viewer.coverage().depth_target("b").copied();

        let outcomes = viewer.load_camera_map(THREE_CAMERAS).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(viewer.coverage().cameras().position("b"), Some(0));
        assert_eq!(viewer.coverage().depth_target("b").copied(), target);
        let b = viewer.coverage().camera("b").unwrap();
        assert!((b.position() - Vec3::new(300.0, 250.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_blocked_allocation_rejects_new_cameras() {
        let mut viewer = Viewer::from_backend(
            DummyBackend::new().with_texture_budget(1),
            PlannerConfig {
                depth_resolution: 256,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = viewer
            .create_camera("a", Vec3::new(0.0, 250.0, 0.0), Vec3::ZERO)
            .unwrap();
        assert!(matches!(outcome, AddOutcome::WithoutDepthTarget { .. }));

        assert!(matches!(
            viewer.create_camera("b", Vec3::new(300.0, 250.0, 0.0), Vec3::ZERO),
            Err(ViewerError::Coverage(CoverageError::AllocationBlocked))
        ));
        assert!(viewer.coverage().camera("b").is_none());
    }

    #[test]
    fn test_render_records_depth_passes_before_coverage_pass() {
        let mut viewer = viewer();
        viewer.load_floor_plan(PLAN, &ExtrudeOptions::default()).unwrap();
        viewer
            .create_camera("a", Vec3::new(0.0, 250.0, 0.0), Vec3::new(100.0, 0.0, 0.0))
            .unwrap();
        viewer
            .create_camera("b", Vec3::new(300.0, 250.0, 0.0), Vec3::ZERO)
            .unwrap();
        viewer.render().unwrap();

        let labels: Vec<_> = viewer
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginRenderPass { label, .. } => label.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec!["Depth Pass a", "Depth Pass b", "Coverage Pass"]);
        assert_eq!(viewer.backend().commands().last(), Some(&RecordedCommand::EndFrame));
    }

    #[test]
    fn test_resize_updates_viewer_aspect() {
        let mut viewer = viewer();
        viewer.resize(800, 400);
        assert_eq!(viewer.dimensions(), (800, 400));
        assert!((viewer.scene().camera.aspect - 2.0).abs() < 1e-6);
    }
}
