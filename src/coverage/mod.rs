//! Multi-camera coverage
//!
//! Tracks which CCTV cameras are active, owns one depth target per camera,
//! generates the shading program for the current camera capacity and feeds
//! it camera and lighting state every frame.

pub mod active_set;
pub mod depth_targets;
pub mod layout;
pub mod program;
pub mod reference;
pub mod uniforms;

pub use active_set::ActiveCameraSet;
pub use depth_targets::{DepthTarget, DepthTargetConfig, DepthTargetManager};
pub use layout::CoverageLayout;
pub use program::{CoverageProgram, ProgramReflection, MAX_CAMERA_SLOTS};
pub use reference::CoverageClass;
pub use uniforms::{BindingKey, CameraSlot, UniformSynchronizer};

use crate::backend::traits::*;
use crate::scene::{CameraError, SceneLighting, VirtualCamera};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("all {capacity} camera slots are in use")]
    CapacityExceeded { capacity: u32 },
    #[error("camera '{0}' is already active")]
    DuplicateCamera(String),
    #[error("no active camera named '{0}'")]
    UnknownCamera(String),
    #[error("camera capacity must be between 1 and {max}, got {requested}")]
    InvalidCapacity { requested: u32, max: u32 },
    #[error("camera capacity {requested} is below the {active} active cameras")]
    CapacityBelowActive { requested: u32, active: u32 },
    #[error("out of GPU memory for depth targets; remove a camera first")]
    AllocationBlocked,
    #[error("coverage program is invalid: {0}")]
    InvalidProgram(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type CoverageResult<T> = Result<T, CoverageError>;

/// Result of activating a camera
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added { slot: usize },
    /// The camera is active but its surfaces are never treated as occluded
    WithoutDepthTarget { slot: usize, error: BackendError },
}

impl AddOutcome {
    pub fn slot(&self) -> usize {
        match self {
            AddOutcome::Added { slot } | AddOutcome::WithoutDepthTarget { slot, .. } => *slot,
        }
    }
}

/// Camera whose depth target must be rendered this frame
#[derive(Debug, Clone, Copy)]
pub struct DepthPassTarget<'a> {
    pub slot: usize,
    pub camera: &'a VirtualCamera,
    pub target: DepthTarget,
}

/// Active cameras together with everything needed to shade their coverage
pub struct CoverageSystem {
    program: CoverageProgram,
    program_generation: u64,
    cameras: ActiveCameraSet,
    targets: DepthTargetManager,
    uniforms: UniformSynchronizer,
    allocation_blocked: bool,
}

impl CoverageSystem {
    pub fn new(capacity: u32, depth_targets: DepthTargetConfig) -> CoverageResult<Self> {
        let program = CoverageProgram::generate(capacity)?;
        program.validate()?;
        let uniforms = UniformSynchronizer::new(program.layout().clone());
        Ok(Self {
            program,
            program_generation: 0,
            cameras: ActiveCameraSet::new(capacity as usize),
            targets: DepthTargetManager::new(depth_targets),
            uniforms,
            allocation_blocked: false,
        })
    }

    /// Activate `camera` and give it a depth target.
    ///
    /// A failed allocation keeps the camera active without occlusion and
    /// sets `allocation_blocked`. While blocked, further additions are
    /// rejected until a camera is removed.
    pub fn add_camera<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        camera: VirtualCamera,
    ) -> CoverageResult<AddOutcome> {
        if self.allocation_blocked {
            return Err(CoverageError::AllocationBlocked);
        }
        let name = camera.name().to_string();
        let slot = self.cameras.insert(camera)?;

        match self.targets.allocate(backend, &name) {
            Ok(_) => {
                self.allocation_blocked = false;
                log::info!("Camera '{}' active in slot {}", name, slot);
                Ok(AddOutcome::Added { slot })
            }
            Err(error) => {
                log::warn!(
                    "Camera '{}' active in slot {} without occlusion: {}",
                    name,
                    slot,
                    error
                );
                self.allocation_blocked = true;
                Ok(AddOutcome::WithoutDepthTarget { slot, error })
            }
        }
    }

    /// Deactivate a camera and free its depth target
    pub fn remove_camera<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        name: &str,
    ) -> CoverageResult<VirtualCamera> {
        let camera = self
            .cameras
            .remove(name)
            .ok_or_else(|| CoverageError::UnknownCamera(name.to_string()))?;
        self.targets.release(backend, name);
        self.allocation_blocked = false;
        log::info!("Camera '{}' removed", name);
        Ok(camera)
    }

    /// Regenerate the program for `capacity` camera slots
    pub fn set_camera_capacity<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        capacity: u32,
    ) -> CoverageResult<()> {
        let active = self.cameras.len() as u32;
        if capacity < active {
            return Err(CoverageError::CapacityBelowActive {
                requested: capacity,
                active,
            });
        }
        let program = CoverageProgram::generate(capacity)?;
        program.validate()?;
        self.cameras.set_capacity(capacity as usize)?;

        self.uniforms.release(backend);
        self.uniforms = UniformSynchronizer::new(program.layout().clone());
        self.program = program;
        self.program_generation += 1;
        log::info!("Coverage program regenerated for {} cameras", capacity);
        Ok(())
    }

    pub fn camera(&self, name: &str) -> Option<&VirtualCamera> {
        self.cameras.get(name)
    }

    /// Edit a camera in place; its slot and depth target are kept
    pub fn camera_mut(&mut self, name: &str) -> Option<&mut VirtualCamera> {
        self.cameras.get_mut(name)
    }

    pub fn cameras(&self) -> &ActiveCameraSet {
        &self.cameras
    }

    pub fn depth_target(&self, name: &str) -> Option<&DepthTarget> {
        self.targets.lookup(name)
    }

    pub fn depth_targets(&self) -> &DepthTargetManager {
        &self.targets
    }

    pub fn program(&self) -> &CoverageProgram {
        &self.program
    }

    /// Bumped every time the program is regenerated
    pub fn program_generation(&self) -> u64 {
        self.program_generation
    }

    pub fn capacity(&self) -> u32 {
        self.program.capacity()
    }

    /// True after a depth target could not be allocated, until one succeeds
    pub fn allocation_blocked(&self) -> bool {
        self.allocation_blocked
    }

    /// Uniform values for every active camera, in slot order
    pub fn camera_slots(&self) -> Vec<CameraSlot> {
        self.cameras
            .iter()
            .map(|camera| CameraSlot::from_camera(camera, self.targets.lookup(camera.name()).is_some()))
            .collect()
    }

    /// Cameras with a depth target, in slot order
    pub fn depth_passes(&self) -> impl Iterator<Item = DepthPassTarget<'_>> {
        self.cameras.iter().enumerate().filter_map(|(slot, camera)| {
            self.targets
                .lookup(camera.name())
                .map(|target| DepthPassTarget {
                    slot,
                    camera,
                    target: *target,
                })
        })
    }

    /// Upload this frame's uniforms and return the coverage bind group
    pub fn prepare_frame<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        lighting: &SceneLighting,
        bind_group_layout: BindGroupLayoutHandle,
        sampler: SamplerHandle,
    ) -> CoverageResult<BindGroupHandle> {
        let slots = self.camera_slots();
        self.uniforms.pack_cameras(&slots);
        self.uniforms.set_lighting(lighting);
        self.uniforms.flush(backend)?;

        let fallback = self.targets.fallback_view(backend)?;
        let mut views = vec![fallback; self.capacity() as usize];
        for (view, camera) in views.iter_mut().zip(self.cameras.iter()) {
            if let Some(target) = self.targets.lookup(camera.name()) {
                *view = target.view;
            }
        }

        let key = BindingKey {
            camera_set: self.cameras.generation(),
            depth_targets: self.targets.generation(),
            layout: bind_group_layout,
            sampler,
        };
        Ok(self.uniforms.sync_bind_group(backend, &views, key)?)
    }

    pub fn uniforms(&self) -> &UniformSynchronizer {
        &self.uniforms
    }

    /// Free every GPU resource owned by the system
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.uniforms.release(backend);
        self.targets.release_all(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::scene::OpticalSettings;

    fn camera(name: &str) -> VirtualCamera {
        VirtualCamera::new(name, OpticalSettings::default()).unwrap()
    }

    fn system(capacity: u32) -> CoverageSystem {
        CoverageSystem::new(
            capacity,
            DepthTargetConfig {
                resolution: 64,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_add_and_remove_manage_depth_targets() {
        let mut backend = DummyBackend::new();
        let mut coverage = system(2);

        assert_eq!(
            coverage.add_camera(&mut backend, camera("a")).unwrap(),
            AddOutcome::Added { slot: 0 }
        );
        assert!(coverage.depth_target("a").is_some());

        coverage.remove_camera(&mut backend, "a").unwrap();
        assert!(coverage.depth_target("a").is_none());
        assert!(coverage.camera("a").is_none());
        assert!(matches!(
            coverage.remove_camera(&mut backend, "a"),
            Err(CoverageError::UnknownCamera(_))
        ));
    }

    #[test]
    fn test_add_beyond_capacity_is_rejected() {
        let mut backend = DummyBackend::new();
        let mut coverage = system(1);
        coverage.add_camera(&mut backend, camera("a")).unwrap();
        assert!(matches!(
            coverage.add_camera(&mut backend, camera("b")),
            Err(CoverageError::CapacityExceeded { capacity: 1 })
        ));
        assert!(coverage.depth_target("b").is_none());
    }

    #[test]
    fn test_failed_allocation_keeps_camera() {
        // Room for the scratch attachment only
        let mut backend = DummyBackend::new().with_texture_budget(1);
        let mut coverage = system(2);

        let outcome = coverage.add_camera(&mut backend, camera("a")).unwrap();
        assert!(matches!(
            outcome,
            AddOutcome::WithoutDepthTarget {
                slot: 0,
                error: BackendError::OutOfMemory
            }
        ));
        assert!(coverage.allocation_blocked());
        assert!(coverage.camera("a").is_some());
        assert!(!coverage.camera_slots()[0].has_depth_target());
    }

    #[test]
    fn test_blocked_allocation_rejects_additions_until_removal() {
        let mut backend = DummyBackend::new().with_texture_budget(1);
        let mut coverage = system(3);
        coverage.add_camera(&mut backend, camera("a")).unwrap();
        assert!(coverage.allocation_blocked());

        assert!(matches!(
            coverage.add_camera(&mut backend, camera("b")),
            Err(CoverageError::AllocationBlocked)
        ));
        assert!(coverage.camera("b").is_none());
        assert_eq!(coverage.cameras().len(), 1);

        coverage.remove_camera(&mut backend, "a").unwrap();
        assert!(!coverage.allocation_blocked());
        assert!(coverage.add_camera(&mut backend, camera("b")).is_ok());
    }

    #[test]
    fn test_new_system_carries_a_validated_program() {
        for capacity in [1, 4, MAX_CAMERA_SLOTS] {
            let coverage = system(capacity);
            let reflection = coverage.program().validate().unwrap();
            assert_eq!(reflection.depth_maps.len(), capacity as usize);
        }
        assert!(matches!(
            CoverageSystem::new(0, DepthTargetConfig::default()),
            Err(CoverageError::InvalidCapacity { .. })
        ));
        assert!(matches!(
            CoverageSystem::new(MAX_CAMERA_SLOTS + 1, DepthTargetConfig::default()),
            Err(CoverageError::InvalidCapacity { .. })
        ));
    }

    #[test]
    fn test_capacity_change_regenerates_program() {
        let mut backend = DummyBackend::new();
        let mut coverage = system(2);
        coverage.add_camera(&mut backend, camera("a")).unwrap();
        coverage.add_camera(&mut backend, camera("b")).unwrap();

        assert!(matches!(
            coverage.set_camera_capacity(&mut backend, 1),
            Err(CoverageError::CapacityBelowActive { requested: 1, active: 2 })
        ));
        assert_eq!(coverage.program_generation(), 0);

        coverage.set_camera_capacity(&mut backend, 6).unwrap();
        assert_eq!(coverage.capacity(), 6);
        assert_eq!(coverage.program_generation(), 1);
        assert!(coverage.program().source().contains("array<vec4<f32>, 6>"));
        coverage.add_camera(&mut backend, camera("c")).unwrap();
    }

    #[test]
    fn test_prepare_frame_binds_fallback_for_empty_slots() {
        let mut backend = DummyBackend::new();
        let mut coverage = system(3);
        coverage.add_camera(&mut backend, camera("a")).unwrap();

        let entries = uniforms::bind_group_layout_entries(coverage.program().layout(), true);
        let bgl = backend.create_bind_group_layout(&entries).unwrap();
        let sampler = backend
            .create_sampler(&crate::backend::types::SamplerDescriptor::default())
            .unwrap();
        let bind_group = coverage
            .prepare_frame(&mut backend, &SceneLighting::default(), bgl, sampler)
            .unwrap();

        let target_view = coverage.depth_target("a").unwrap().view;
        let bound = backend.bind_group_entries(bind_group).unwrap();
        assert_eq!(bound[2].1, BindGroupEntry::Texture(target_view));
        assert_eq!(bound[3].1, bound[4].1);
        assert_ne!(bound[3].1, BindGroupEntry::Texture(target_view));
    }
}
