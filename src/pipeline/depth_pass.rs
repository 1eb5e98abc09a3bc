//! Depth passes for CCTV cameras
//!
//! Renders the scene from every camera that owns a depth target. The target
//! is an `R32Float` color texture receiving the fragment's clip-space depth,
//! so it can be sampled with a plain `texture_2d<f32>` on every platform.

use super::{CameraBinding, SceneResources, SharedLayouts};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::coverage::{CoverageResult, CoverageSystem};
use crate::scene::CameraUniformData;

/// Texel value of a cleared depth target, the far plane
pub const CLEAR_DEPTH: f32 = 1.0;

const DEPTH_SHADER: &str = r#"
struct CameraUniforms {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    view_proj: mat4x4<f32>,
    position: vec4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(1) @binding(0) var<uniform> object: ObjectUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = camera.view_proj * object.model * vec4<f32>(input.position, 1.0);
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(input.clip_position.z, 0.0, 0.0, 1.0);
}
"#;

/// Records one depth pass per camera with a depth target
pub struct DepthMapPass {
    pipeline: RenderPipelineHandle,
    camera_layout: BindGroupLayoutHandle,
    /// One camera buffer per slot. Buffer writes land before the command
    /// stream is submitted, so passes in the same frame cannot share one.
    slots: Vec<CameraBinding>,
}

impl DepthMapPass {
    pub fn new<B: GraphicsBackend>(backend: &mut B, layouts: &SharedLayouts) -> BackendResult<Self> {
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Depth Map Pipeline".into()),
            shader: DEPTH_SHADER.to_string(),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![layouts.camera, layouts.object],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: TextureFormat::R32Float,
            }],
        })?;

        Ok(Self {
            pipeline,
            camera_layout: layouts.camera,
            slots: Vec::new(),
        })
    }

    fn slot_binding<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        slot: usize,
    ) -> BackendResult<CameraBinding> {
        while self.slots.len() <= slot {
            let label = format!("Depth Camera Buffer {}", self.slots.len());
            let binding = CameraBinding::new(backend, self.camera_layout, &label)?;
            self.slots.push(binding);
        }
        Ok(self.slots[slot])
    }

    /// Record the depth passes and return how many were recorded
    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        coverage: &CoverageSystem,
        scene: &SceneResources,
    ) -> CoverageResult<usize> {
        let Some(scratch) = coverage.depth_targets().scratch_view() else {
            return Ok(0);
        };

        let mut recorded = 0;
        for pass in coverage.depth_passes() {
            let binding = self.slot_binding(backend, pass.slot)?;
            let uniform = CameraUniformData::from_camera(pass.camera);
            backend.write_buffer(binding.buffer, 0, bytemuck::bytes_of(&uniform));

            backend.begin_render_pass(&RenderPassDescriptor {
                label: Some(format!("Depth Pass {}", pass.camera.name())),
                color_attachments: vec![ColorAttachment {
                    view: pass.target.view,
                    load_op: LoadOp::Clear([CLEAR_DEPTH, 0.0, 0.0, 0.0]),
                    store_op: StoreOp::Store,
                }],
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view: scratch,
                    depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                    depth_store_op: StoreOp::Discard,
                    depth_clear_value: 1.0,
                }),
            });

            let size = pass.target.resolution as f32;
            backend.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);
            backend.set_render_pipeline(self.pipeline);
            backend.set_bind_group(0, binding.bind_group);
            scene.draw(backend);
            backend.end_render_pass();
            recorded += 1;
        }
        Ok(recorded)
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        for binding in self.slots.drain(..) {
            binding.release(backend);
        }
    }
}
