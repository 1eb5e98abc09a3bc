//! Coverage rendering pipeline
//!
//! Every frame runs in two stages recorded into the same command stream:
//! 1. Depth passes - one per camera with a depth target, rendering the scene
//!    from that camera into its target
//! 2. Coverage pass - renders the scene from the viewer camera with the
//!    generated coverage program, sampling every depth target

pub mod coverage_pass;
pub mod depth_pass;

pub use coverage_pass::CoveragePass;
pub use depth_pass::DepthMapPass;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::coverage::{CoverageResult, CoverageSystem};
use crate::scene::{CameraUniformData, ObjectUniformData, Scene};

/// Bind group layouts shared by both stages
#[derive(Debug, Clone, Copy)]
pub struct SharedLayouts {
    /// Group 0: `CameraUniformData`
    pub camera: BindGroupLayoutHandle,
    /// Group 1: `ObjectUniformData`
    pub object: BindGroupLayoutHandle,
}

impl SharedLayouts {
    pub fn new<B: GraphicsBackend>(backend: &mut B) -> BackendResult<Self> {
        let camera = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        let object = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        Ok(Self { camera, object })
    }
}

/// A camera uniform buffer with its group 0 bind group
#[derive(Debug, Clone, Copy)]
pub(crate) struct CameraBinding {
    pub buffer: BufferHandle,
    pub bind_group: BindGroupHandle,
}

impl CameraBinding {
    pub fn new<B: GraphicsBackend>(
        backend: &mut B,
        layout: BindGroupLayoutHandle,
        label: &str,
    ) -> BackendResult<Self> {
        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: std::mem::size_of::<CameraUniformData>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let bind_group = match backend.create_bind_group(
            layout,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: None,
                },
            )],
        ) {
            Ok(bind_group) => bind_group,
            Err(e) => {
                backend.destroy_buffer(buffer);
                return Err(e);
            }
        };
        Ok(Self { buffer, bind_group })
    }

    pub fn release<B: GraphicsBackend>(&self, backend: &mut B) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_buffer(self.buffer);
    }
}

/// GPU resources for a mesh
struct GpuMesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
}

/// Per-object GPU resources
struct GpuObject {
    mesh_id: usize,
    buffer: BufferHandle,
    bind_group: BindGroupHandle,
}

/// GPU copies of the scene geometry, re-uploaded when the scene revision
/// changes
#[derive(Default)]
pub struct SceneResources {
    revision: Option<u64>,
    meshes: Vec<GpuMesh>,
    objects: Vec<GpuObject>,
}

impl SceneResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Upload meshes and object uniforms if the scene changed
    pub fn sync<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        object_layout: BindGroupLayoutHandle,
    ) -> BackendResult<()> {
        if self.revision == Some(scene.revision()) {
            return Ok(());
        }
        self.release(backend);

        for (id, mesh) in scene.meshes().iter().enumerate() {
            let vertex_data = mesh.vertex_bytes();
            let index_data = mesh.index_bytes();

            let vertex_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Vertex Buffer {}", id)),
                    size: vertex_data.len() as u64,
                    usage: BufferUsage::VERTEX,
                },
                vertex_data,
            )?;
            let index_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Index Buffer {}", id)),
                    size: index_data.len() as u64,
                    usage: BufferUsage::INDEX,
                },
                index_data,
            )?;

            self.meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count() as u32,
            });
        }

        for (id, object) in scene.objects().iter().enumerate() {
            let uniform: ObjectUniformData = object.transform.uniform_data(object.material.base_color);
            let buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("Object Buffer {}", id)),
                    size: std::mem::size_of::<ObjectUniformData>() as u64,
                    usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                },
                bytemuck::bytes_of(&uniform),
            )?;
            let bind_group = backend.create_bind_group(
                object_layout,
                &[(
                    0,
                    BindGroupEntry::Buffer {
                        buffer,
                        offset: 0,
                        size: None,
                    },
                )],
            )?;
            self.objects.push(GpuObject {
                mesh_id: object.mesh_id,
                buffer,
                bind_group,
            });
        }

        self.revision = Some(scene.revision());
        log::debug!(
            "Uploaded {} meshes and {} objects (scene revision {})",
            self.meshes.len(),
            self.objects.len(),
            scene.revision()
        );
        Ok(())
    }

    /// Draw every object, binding its uniforms at group 1
    pub fn draw<B: GraphicsBackend>(&self, backend: &mut B) {
        for object in &self.objects {
            let Some(mesh) = self.meshes.get(object.mesh_id) else {
                continue;
            };
            backend.set_bind_group(1, object.bind_group);
            backend.set_vertex_buffer(0, mesh.vertex_buffer, 0);
            backend.set_index_buffer(mesh.index_buffer, 0, IndexFormat::Uint32);
            backend.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for object in self.objects.drain(..) {
            backend.destroy_bind_group(object.bind_group);
            backend.destroy_buffer(object.buffer);
        }
        for mesh in self.meshes.drain(..) {
            backend.destroy_buffer(mesh.vertex_buffer);
            backend.destroy_buffer(mesh.index_buffer);
        }
        self.revision = None;
    }
}

/// Runs the depth passes and the coverage pass for one frame
pub struct CoverageRenderer {
    layouts: SharedLayouts,
    scene_resources: SceneResources,
    depth_pass: DepthMapPass,
    coverage_pass: CoveragePass,
}

impl CoverageRenderer {
    pub fn new<B: GraphicsBackend>(backend: &mut B, clear_color: [f32; 4]) -> BackendResult<Self> {
        let layouts = SharedLayouts::new(backend)?;
        let depth_pass = DepthMapPass::new(backend, &layouts)?;
        Ok(Self {
            layouts,
            scene_resources: SceneResources::new(),
            depth_pass,
            coverage_pass: CoveragePass::new(clear_color),
        })
    }

    pub fn scene_resources(&self) -> &SceneResources {
        &self.scene_resources
    }

    /// Record all passes for `frame`. The caller begins and ends the frame.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        coverage: &mut CoverageSystem,
        frame: &FrameContext,
    ) -> CoverageResult<()> {
        self.scene_resources
            .sync(backend, scene, self.layouts.object)?;

        let depth_passes = self
            .depth_pass
            .render(backend, coverage, &self.scene_resources)?;
        log::trace!("Rendered {} depth passes", depth_passes);

        self.coverage_pass.render(
            backend,
            &self.layouts,
            scene,
            coverage,
            &self.scene_resources,
            frame,
        )
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.scene_resources.release(backend);
        self.depth_pass.release(backend);
        self.coverage_pass.release(backend);
    }
}
