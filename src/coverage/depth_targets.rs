//! Per-camera depth targets
//!
//! Every active camera owns one square floating-point color target that its
//! depth pass writes clip-space depth into. The coverage pass samples it to
//! decide occlusion.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;

/// Depth target settings shared by all cameras
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthTargetConfig {
    /// Width and height in texels
    pub resolution: u32,
    pub format: TextureFormat,
}

impl Default for DepthTargetConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            format: TextureFormat::R32Float,
        }
    }
}

/// Off-screen target owned by one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTarget {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub resolution: u32,
}

#[derive(Debug, Clone, Copy)]
struct OwnedTexture {
    texture: TextureHandle,
    view: TextureViewHandle,
}

/// Creates, looks up and frees depth targets keyed by camera name
pub struct DepthTargetManager {
    config: DepthTargetConfig,
    targets: HashMap<String, DepthTarget>,
    /// Depth32Float attachment for z-testing while a target is rendered
    scratch: Option<OwnedTexture>,
    /// 1x1 target at maximum depth bound to slots without a camera target
    fallback: Option<OwnedTexture>,
    generation: u64,
}

impl DepthTargetManager {
    pub fn new(config: DepthTargetConfig) -> Self {
        Self {
            config,
            targets: HashMap::new(),
            scratch: None,
            fallback: None,
            generation: 0,
        }
    }

    pub fn config(&self) -> &DepthTargetConfig {
        &self.config
    }

    /// Create the target for `camera`, replacing any existing one
    pub fn allocate<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        camera: &str,
    ) -> BackendResult<DepthTarget> {
        self.release(backend, camera);

        let result = self.create_target(backend, camera);
        match &result {
            Ok(target) => {
                log::debug!(
                    "Allocated {}x{} depth target for camera '{}'",
                    target.resolution,
                    target.resolution,
                    camera
                );
                self.targets.insert(camera.to_string(), *target);
                self.generation += 1;
            }
            Err(e) => log::error!("Failed to allocate depth target for camera '{}': {}", camera, e),
        }
        result
    }

    fn create_target<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        camera: &str,
    ) -> BackendResult<DepthTarget> {
        let resolution = self.config.resolution;
        let max = backend.capabilities().max_texture_dimension_2d;
        if resolution == 0 || resolution > max {
            return Err(BackendError::TextureCreationFailed(format!(
                "depth target resolution {} exceeds device limit {}",
                resolution, max
            )));
        }

        self.ensure_scratch(backend)?;

        let texture = backend.create_texture(&TextureDescriptor {
            label: Some(format!("Depth Target {}", camera)),
            width: resolution,
            height: resolution,
            format: self.config.format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let view = match backend.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };

        Ok(DepthTarget {
            texture,
            view,
            resolution,
        })
    }

    fn ensure_scratch<B: GraphicsBackend>(&mut self, backend: &mut B) -> BackendResult<()> {
        if self.scratch.is_some() {
            return Ok(());
        }
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Depth Target Scratch".into()),
            width: self.config.resolution,
            height: self.config.resolution,
            format: TextureFormat::Depth32Float,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        let view = match backend.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };
        self.scratch = Some(OwnedTexture { texture, view });
        Ok(())
    }

    /// Free the target of `camera`. Returns false if it had none.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B, camera: &str) -> bool {
        let Some(target) = self.targets.remove(camera) else {
            return false;
        };
        backend.destroy_texture(target.texture);
        self.generation += 1;
        log::debug!("Released depth target for camera '{}'", camera);
        true
    }

    pub fn lookup(&self, camera: &str) -> Option<&DepthTarget> {
        self.targets.get(camera)
    }

    /// Depth attachment shared by all depth passes, once any target exists
    pub fn scratch_view(&self) -> Option<TextureViewHandle> {
        self.scratch.map(|s| s.view)
    }

    /// View bound in place of a missing target. Created on first use.
    pub fn fallback_view<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
    ) -> BackendResult<TextureViewHandle> {
        if let Some(fallback) = self.fallback {
            return Ok(fallback.view);
        }
        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Depth Target Fallback".into()),
            width: 1,
            height: 1,
            format: self.config.format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let view = match backend.create_texture_view(texture) {
            Ok(view) => view,
            Err(e) => {
                backend.destroy_texture(texture);
                return Err(e);
            }
        };
        backend.write_texture(texture, bytemuck::bytes_of(&1.0f32), 1, 1);
        self.fallback = Some(OwnedTexture { texture, view });
        Ok(view)
    }

    /// Bumped on every allocate and release
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Free every texture this manager created
    pub fn release_all<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for (_, target) in self.targets.drain() {
            backend.destroy_texture(target.texture);
        }
        for owned in [self.scratch.take(), self.fallback.take()].into_iter().flatten() {
            backend.destroy_texture(owned.texture);
        }
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn manager() -> DepthTargetManager {
        DepthTargetManager::new(DepthTargetConfig {
            resolution: 256,
            ..Default::default()
        })
    }

    #[test]
    fn test_allocate_release_lookup() {
        let mut backend = DummyBackend::new();
        let mut targets = manager();

        let a = targets.allocate(&mut backend, "a").unwrap();
        let b = targets.allocate(&mut backend, "b").unwrap();
        assert_ne!(a.texture, b.texture);
        assert_ne!(a.view, b.view);
        assert_eq!(targets.lookup("a"), Some(&a));

        assert!(targets.release(&mut backend, "a"));
        assert!(targets.lookup("a").is_none());
        assert!(!targets.release(&mut backend, "a"));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_reallocate_replaces_texture() {
        let mut backend = DummyBackend::new();
        let mut targets = manager();

        let first = targets.allocate(&mut backend, "cam").unwrap();
        let textures_after_first = backend.live_texture_count();
        let second = targets.allocate(&mut backend, "cam").unwrap();

        assert_ne!(first.texture, second.texture);
        assert_eq!(backend.live_texture_count(), textures_after_first);
        assert!(backend.texture_descriptor(first.texture).is_none());
    }

    #[test]
    fn test_target_matches_config() {
        let mut backend = DummyBackend::new();
        let mut targets = manager();
        let target = targets.allocate(&mut backend, "cam").unwrap();

        let desc = backend.texture_descriptor(target.texture).unwrap();
        assert_eq!((desc.width, desc.height), (256, 256));
        assert_eq!(desc.format, TextureFormat::R32Float);
        assert!(desc.usage.contains(TextureUsage::TEXTURE_BINDING));

        let scratch = targets.scratch_view().unwrap();
        let scratch_texture = backend.view_texture(scratch).unwrap();
        assert_eq!(
            backend.texture_descriptor(scratch_texture).unwrap().format,
            TextureFormat::Depth32Float
        );
    }

    #[test]
    fn test_oversized_target_is_reported() {
        let mut backend = DummyBackend::new().with_capabilities(DeviceCapabilities {
            max_texture_dimension_2d: 128,
            ..Default::default()
        });
        let mut targets = manager();
        let before = targets.generation();

        assert!(matches!(
            targets.allocate(&mut backend, "cam"),
            Err(BackendError::TextureCreationFailed(_))
        ));
        assert!(targets.lookup("cam").is_none());
        assert_eq!(targets.generation(), before);
    }

    #[test]
    fn test_fallback_is_created_once() {
        let mut backend = DummyBackend::new();
        let mut targets = manager();
        let first = targets.fallback_view(&mut backend).unwrap();
        let second = targets.fallback_view(&mut backend).unwrap();
        assert_eq!(first, second);

        let texture = backend.view_texture(first).unwrap();
        let desc = backend.texture_descriptor(texture).unwrap();
        assert_eq!((desc.width, desc.height), (1, 1));
    }

    #[test]
    fn test_release_all_frees_everything() {
        let mut backend = DummyBackend::new();
        let mut targets = manager();
        targets.allocate(&mut backend, "a").unwrap();
        targets.fallback_view(&mut backend).unwrap();
        targets.release_all(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
        assert!(targets.is_empty());
        assert!(targets.scratch_view().is_none());
    }
}
