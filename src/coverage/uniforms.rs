//! Per-frame upload of camera and lighting state
//!
//! Values are packed into a CPU staging copy of the coverage uniform block
//! at the offsets the layout computed, then flushed to one uniform buffer.

use super::layout::{CoverageLayout, FIRST_DEPTH_MAP_BINDING, SAMPLER_BINDING, UNIFORM_BINDING};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::scene::{ProjectingCamera, SceneLighting};
use glam::{Mat4, Vec4};

/// Everything the coverage program reads about one camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSlot {
    /// xyz position, w = 1 when a depth target is bound for the slot
    pub position: Vec4,
    pub direction: Vec4,
    /// fov_y in degrees, aspect, near, far
    pub frustum: Vec4,
    /// World to the camera's clip space
    pub shadow_matrix: Mat4,
}

impl CameraSlot {
    pub fn from_camera(camera: &impl ProjectingCamera, has_depth_target: bool) -> Self {
        Self {
            position: camera
                .position()
                .extend(if has_depth_target { 1.0 } else { 0.0 }),
            direction: camera.view_direction().extend(0.0),
            frustum: Vec4::new(
                camera.fov_y_degrees(),
                camera.aspect(),
                camera.near(),
                camera.far(),
            ),
            shadow_matrix: camera.view_projection_matrix(),
        }
    }

    pub fn has_depth_target(&self) -> bool {
        self.position.w > 0.5
    }
}

/// Identifies the resources a coverage bind group was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingKey {
    pub camera_set: u64,
    pub depth_targets: u64,
    pub layout: BindGroupLayoutHandle,
    pub sampler: SamplerHandle,
}

/// Bind group layout entries for the coverage group
pub fn bind_group_layout_entries(
    layout: &CoverageLayout,
    filterable: bool,
) -> Vec<BindGroupLayoutEntry> {
    let mut entries = vec![
        BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        },
        BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::Sampler {
                filtering: filterable,
            },
        },
    ];
    entries.extend(layout.depth_maps().into_iter().map(|slot| BindGroupLayoutEntry {
        binding: slot.binding,
        visibility: ShaderStageFlags::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable },
        },
    }));
    entries
}

/// Keeps the coverage uniform buffer and bind group in step with the scene
pub struct UniformSynchronizer {
    layout: CoverageLayout,
    staging: Vec<u8>,
    buffer: Option<BufferHandle>,
    last_lighting: Option<SceneLighting>,
    lighting_dirty: bool,
    bind_group: Option<(BindGroupHandle, BindingKey)>,
}

impl UniformSynchronizer {
    pub fn new(layout: CoverageLayout) -> Self {
        let staging = vec![0; layout.size() as usize];
        Self {
            layout,
            staging,
            buffer: None,
            last_lighting: None,
            lighting_dirty: false,
            bind_group: None,
        }
    }

    pub fn layout(&self) -> &CoverageLayout {
        &self.layout
    }

    /// CPU copy of the uniform block
    pub fn staging(&self) -> &[u8] {
        &self.staging
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    fn put<T: bytemuck::Pod>(&mut self, offset: u32, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        let start = offset as usize;
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Write `slots` into slots `0..slots.len()`, zero the rest and store
    /// the active count
    pub fn pack_cameras(&mut self, slots: &[CameraSlot]) {
        let capacity = self.layout.capacity();
        let active = (slots.len() as u32).min(capacity);
        if slots.len() as u32 > capacity {
            log::warn!(
                "{} camera slots packed into a program for {}; extra slots dropped",
                slots.len(),
                capacity
            );
        }

        let region = self.layout.camera_region();
        self.staging[region.start as usize..region.end as usize].fill(0);

        let (positions, directions, frustums, shadows) = (
            self.layout.cctv_positions,
            self.layout.cctv_directions,
            self.layout.cctv_frustums,
            self.layout.shadow_matrices,
        );
        for (i, slot) in slots.iter().take(active as usize).enumerate() {
            let i = i as u32;
            self.put(positions.element_offset(i), &slot.position);
            self.put(directions.element_offset(i), &slot.direction);
            self.put(frustums.element_offset(i), &slot.frustum);
            self.put(shadows.element_offset(i), &slot.shadow_matrix);
        }
        self.put(self.layout.cctv_count.offset, &active);
    }

    /// Store lighting if it differs from what was last written
    pub fn set_lighting(&mut self, lighting: &SceneLighting) {
        if self.last_lighting.as_ref() == Some(lighting) {
            return;
        }
        let fields = self.layout.lighting_fields().map(|f| f.offset);
        for (offset, value) in fields.into_iter().zip(lighting.uniform_values()) {
            self.put(offset, &value);
        }
        self.last_lighting = Some(*lighting);
        self.lighting_dirty = true;
    }

    /// Upload staged values. Lighting is only re-sent after it changed.
    pub fn flush<B: GraphicsBackend>(&mut self, backend: &mut B) -> BackendResult<BufferHandle> {
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = backend.create_buffer_init(
                    &BufferDescriptor {
                        label: Some("Coverage Uniforms".into()),
                        size: self.staging.len() as u64,
                        usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                    },
                    &self.staging,
                )?;
                self.buffer = Some(buffer);
                self.lighting_dirty = false;
                return Ok(buffer);
            }
        };

        let cameras = self.layout.camera_region();
        backend.write_buffer(
            buffer,
            cameras.start as u64,
            &self.staging[cameras.start as usize..cameras.end as usize],
        );
        let count = self.layout.cctv_count;
        backend.write_buffer(
            buffer,
            count.offset as u64,
            &self.staging[count.offset as usize..(count.offset + count.size()) as usize],
        );
        if self.lighting_dirty {
            let lighting = self.layout.lighting_region();
            backend.write_buffer(
                buffer,
                lighting.start as u64,
                &self.staging[lighting.start as usize..lighting.end as usize],
            );
            self.lighting_dirty = false;
        }
        Ok(buffer)
    }

    /// Return a bind group for `key`, rebuilding every entry when the key
    /// changed since the last call.
    ///
    /// `views[i]` is bound to the depth map of slot `i`.
    pub fn sync_bind_group<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        views: &[TextureViewHandle],
        key: BindingKey,
    ) -> BackendResult<BindGroupHandle> {
        if let Some((bind_group, current)) = self.bind_group {
            if current == key {
                return Ok(bind_group);
            }
        }
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => self.flush(backend)?,
        };

        let capacity = self.layout.capacity() as usize;
        if views.len() != capacity {
            return Err(BackendError::BindGroupCreationFailed(format!(
                "{} depth views supplied for {} slots",
                views.len(),
                capacity
            )));
        }

        let mut entries = vec![
            (
                UNIFORM_BINDING,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            ),
            (SAMPLER_BINDING, BindGroupEntry::Sampler(key.sampler)),
        ];
        entries.extend(
            views
                .iter()
                .enumerate()
                .map(|(i, view)| (FIRST_DEPTH_MAP_BINDING + i as u32, BindGroupEntry::Texture(*view))),
        );

        let bind_group = backend.create_bind_group(key.layout, &entries)?;
        if let Some((old, _)) = self.bind_group.replace((bind_group, key)) {
            backend.destroy_bind_group(old);
        }
        log::debug!(
            "Rebuilt coverage bind group (camera set {}, depth targets {})",
            key.camera_set,
            key.depth_targets
        );
        Ok(bind_group)
    }

    /// Drop the bind group so the next sync rebuilds it
    pub fn invalidate_bindings<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some((bind_group, _)) = self.bind_group.take() {
            backend.destroy_bind_group(bind_group);
        }
    }

    /// Free the GPU resources owned by this synchronizer
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.invalidate_bindings(backend);
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_buffer(buffer);
        }
        self.last_lighting = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, RecordedCommand};
    use crate::scene::{OpticalSettings, VirtualCamera};
    use glam::Vec3;

    fn read_vec4(bytes: &[u8], offset: u32) -> Vec4 {
        bytemuck::pod_read_unaligned(&bytes[offset as usize..offset as usize + 16])
    }

    fn read_u32(bytes: &[u8], offset: u32) -> u32 {
        bytemuck::pod_read_unaligned(&bytes[offset as usize..offset as usize + 4])
    }

    fn slot(x: f32, has_depth_target: bool) -> CameraSlot {
        let mut camera = VirtualCamera::new("cam", OpticalSettings::default()).unwrap();
        camera
            .place_at(Vec3::new(x, 250.0, 0.0), Vec3::new(x, 250.0, 100.0))
            .unwrap();
        CameraSlot::from_camera(&camera, has_depth_target)
    }

    #[test]
    fn test_pack_cameras_zeroes_unused_slots() {
        let layout = CoverageLayout::new(4);
        let mut sync = UniformSynchronizer::new(layout.clone());
        sync.pack_cameras(&[slot(1.0, true), slot(2.0, true), slot(3.0, true)]);
        sync.pack_cameras(&[slot(10.0, true), slot(20.0, false)]);

        let bytes = sync.staging();
        assert_eq!(read_u32(bytes, layout.cctv_count.offset), 2);
        assert_eq!(
            read_vec4(bytes, layout.cctv_positions.element_offset(1)),
            Vec4::new(20.0, 250.0, 0.0, 0.0)
        );
        assert_eq!(read_vec4(bytes, layout.cctv_positions.element_offset(2)), Vec4::ZERO);
        assert_eq!(read_vec4(bytes, layout.cctv_frustums.element_offset(3)), Vec4::ZERO);

        let frustum = read_vec4(bytes, layout.cctv_frustums.element_offset(0));
        assert!((frustum.x - 48.455).abs() < 1e-2);
        assert_eq!(frustum.z, 5.0);
        assert_eq!(frustum.w, 3000.0);
    }

    #[test]
    fn test_lighting_is_uploaded_once_per_change() {
        let layout = CoverageLayout::new(2);
        let lighting_offset = layout.lighting_region().start as u64;
        let mut backend = DummyBackend::new();
        let mut sync = UniformSynchronizer::new(layout);

        let lighting = SceneLighting::default();
        sync.set_lighting(&lighting);
        sync.flush(&mut backend).unwrap();

        let lighting_writes = |backend: &DummyBackend| {
            backend
                .commands()
                .iter()
                .filter(|c| matches!(c, RecordedCommand::WriteBuffer { offset, .. } if *offset == lighting_offset))
                .count()
        };

        sync.set_lighting(&lighting);
        sync.flush(&mut backend).unwrap();
        assert_eq!(lighting_writes(&backend), 0);

        let mut brighter = lighting;
        brighter.ambient.color = Vec3::splat(0.5);
        sync.set_lighting(&brighter);
        sync.flush(&mut backend).unwrap();
        sync.flush(&mut backend).unwrap();
        assert_eq!(lighting_writes(&backend), 1);
    }

    #[test]
    fn test_bind_group_rebuilt_only_on_key_change() {
        let layout = CoverageLayout::new(2);
        let mut backend = DummyBackend::new();
        let bgl = backend
            .create_bind_group_layout(&bind_group_layout_entries(&layout, true))
            .unwrap();
        let sampler = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor {
                format: TextureFormat::R32Float,
                ..Default::default()
            })
            .unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        let mut sync = UniformSynchronizer::new(layout);

        let key = BindingKey {
            camera_set: 1,
            depth_targets: 1,
            layout: bgl,
            sampler,
        };
        let first = sync.sync_bind_group(&mut backend, &[view, view], key).unwrap();
        let same = sync.sync_bind_group(&mut backend, &[view, view], key).unwrap();
        assert_eq!(first, same);

        let rebuilt = sync
            .sync_bind_group(
                &mut backend,
                &[view, view],
                BindingKey {
                    depth_targets: 2,
                    ..key
                },
            )
            .unwrap();
        assert_ne!(first, rebuilt);
        assert_eq!(backend.live_bind_group_count(), 1);

        let entries = backend.bind_group_entries(rebuilt).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3], (FIRST_DEPTH_MAP_BINDING + 1, BindGroupEntry::Texture(view)));
    }

    #[test]
    fn test_new_sampler_rebuilds_bind_group() {
        let layout = CoverageLayout::new(1);
        let mut backend = DummyBackend::new();
        let bgl = backend
            .create_bind_group_layout(&bind_group_layout_entries(&layout, true))
            .unwrap();
        let linear = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        let nearest = backend
            .create_sampler(&SamplerDescriptor {
                mag_filter: FilterMode::Nearest,
                min_filter: FilterMode::Nearest,
                ..Default::default()
            })
            .unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor {
                format: TextureFormat::R32Float,
                ..Default::default()
            })
            .unwrap();
        let view = backend.create_texture_view(texture).unwrap();
        let mut sync = UniformSynchronizer::new(layout);

        let key = BindingKey {
            camera_set: 1,
            depth_targets: 1,
            layout: bgl,
            sampler: linear,
        };
        let first = sync.sync_bind_group(&mut backend, &[view], key).unwrap();
        let rebuilt = sync
            .sync_bind_group(
                &mut backend,
                &[view],
                BindingKey {
                    sampler: nearest,
                    ..key
                },
            )
            .unwrap();
        assert_ne!(first, rebuilt);
        let entries = backend.bind_group_entries(rebuilt).unwrap();
        assert_eq!(entries[1], (SAMPLER_BINDING, BindGroupEntry::Sampler(nearest)));
    }

    #[test]
    fn test_wrong_view_count_is_an_error() {
        let layout = CoverageLayout::new(3);
        let mut backend = DummyBackend::new();
        let bgl = backend
            .create_bind_group_layout(&bind_group_layout_entries(&layout, false))
            .unwrap();
        let sampler = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        let mut sync = UniformSynchronizer::new(layout);
        let result = sync.sync_bind_group(
            &mut backend,
            &[],
            BindingKey {
                camera_set: 0,
                depth_targets: 0,
                layout: bgl,
                sampler,
            },
        );
        assert!(matches!(result, Err(BackendError::BindGroupCreationFailed(_))));
    }
}
