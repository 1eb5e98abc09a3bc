//! Coverage pass
//!
//! Draws the scene from the viewer camera with the generated coverage
//! program. The pipeline and its coverage bind group layout follow the
//! program and are rebuilt whenever the camera capacity changes.

use super::{CameraBinding, SceneResources, SharedLayouts};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::coverage::uniforms::bind_group_layout_entries;
use crate::coverage::{CoverageResult, CoverageSystem};
use crate::scene::{CameraUniformData, Scene};

struct ProgramPipeline {
    generation: u64,
    pipeline: RenderPipelineHandle,
    coverage_layout: BindGroupLayoutHandle,
}

struct ScreenDepth {
    texture: TextureHandle,
    view: TextureViewHandle,
    size: (u32, u32),
}

/// Main pass shading every surface by how many cameras see it
pub struct CoveragePass {
    clear_color: [f32; 4],
    camera: Option<CameraBinding>,
    sampler: Option<(SamplerHandle, bool)>,
    pipeline: Option<ProgramPipeline>,
    depth: Option<ScreenDepth>,
}

impl CoveragePass {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            camera: None,
            sampler: None,
            pipeline: None,
            depth: None,
        }
    }

    /// Sampler for the depth targets. `R32Float` is only filterable with an
    /// optional device feature, so nearest sampling is the fallback.
    fn ensure_sampler<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
    ) -> BackendResult<(SamplerHandle, bool)> {
        if let Some(sampler) = self.sampler {
            return Ok(sampler);
        }
        let filterable = backend.capabilities().float32_filterable;
        let filter = if filterable {
            FilterMode::Linear
        } else {
            log::warn!("Float32 textures are not filterable on this device, sampling depth targets with nearest filtering");
            FilterMode::Nearest
        };
        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Depth Target Sampler".into()),
            mag_filter: filter,
            min_filter: filter,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
        })?;
        self.sampler = Some((sampler, filterable));
        Ok((sampler, filterable))
    }

    fn ensure_pipeline<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        layouts: &SharedLayouts,
        coverage: &CoverageSystem,
        filterable: bool,
    ) -> CoverageResult<(RenderPipelineHandle, BindGroupLayoutHandle)> {
        let generation = coverage.program_generation();
        if let Some(current) = &self.pipeline {
            if current.generation == generation {
                return Ok((current.pipeline, current.coverage_layout));
            }
        }

        let program = coverage.program();
        let entries = bind_group_layout_entries(program.layout(), filterable);
        let coverage_layout = backend.create_bind_group_layout(&entries)?;
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(format!("Coverage Pipeline ({} cameras)", program.capacity())),
            shader: program.source().to_string(),
            vertex_layouts: vec![Vertex::layout()],
            bind_group_layouts: vec![layouts.camera, layouts.object, coverage_layout],
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: backend.swapchain_format(),
            }],
        })?;

        log::info!(
            "Built coverage pipeline for {} camera slots",
            program.capacity()
        );
        self.pipeline = Some(ProgramPipeline {
            generation,
            pipeline,
            coverage_layout,
        });
        Ok((pipeline, coverage_layout))
    }

    fn ensure_depth<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> BackendResult<TextureViewHandle> {
        if let Some(depth) = &self.depth {
            if depth.size == (width, height) {
                return Ok(depth.view);
            }
        }
        if let Some(old) = self.depth.take() {
            backend.destroy_texture(old.texture);
        }

        let texture = backend.create_texture(&TextureDescriptor {
            label: Some("Screen Depth".into()),
            width,
            height,
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
        self.depth = Some(ScreenDepth {
            texture,
            view,
            size: (width, height),
        });
        Ok(view)
    }

    pub fn render<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        layouts: &SharedLayouts,
        scene: &Scene,
        coverage: &mut CoverageSystem,
        resources: &SceneResources,
        frame: &FrameContext,
    ) -> CoverageResult<()> {
        let (sampler, filterable) = self.ensure_sampler(backend)?;
        let (pipeline, coverage_layout) =
            self.ensure_pipeline(backend, layouts, coverage, filterable)?;
        let depth_view = self.ensure_depth(backend, frame.width, frame.height)?;

        let camera = match self.camera {
            Some(camera) => camera,
            None => {
                let camera = CameraBinding::new(backend, layouts.camera, "Viewer Camera Buffer")?;
                self.camera = Some(camera);
                camera
            }
        };
        let uniform = CameraUniformData::from_camera(&scene.camera);
        backend.write_buffer(camera.buffer, 0, bytemuck::bytes_of(&uniform));

        let coverage_group =
            coverage.prepare_frame(backend, &scene.lighting, coverage_layout, sampler)?;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Coverage Pass".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.swapchain_view,
                load_op: LoadOp::Clear(self.clear_color),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Discard,
                depth_clear_value: 1.0,
            }),
        });
        backend.set_viewport(0.0, 0.0, frame.width as f32, frame.height as f32, 0.0, 1.0);
        backend.set_render_pipeline(pipeline);
        backend.set_bind_group(0, camera.bind_group);
        backend.set_bind_group(2, coverage_group);
        resources.draw(backend);
        backend.end_render_pass();
        Ok(())
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(camera) = self.camera.take() {
            camera.release(backend);
        }
        if let Some(depth) = self.depth.take() {
            backend.destroy_texture(depth.texture);
        }
        self.pipeline = None;
        self.sampler = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::RecordedCommand;
    use crate::backend::DummyBackend;
    use crate::coverage::DepthTargetConfig;

    fn setup() -> (DummyBackend, SharedLayouts, CoverageSystem) {
        setup_on(DummyBackend::new())
    }

    fn setup_on(mut backend: DummyBackend) -> (DummyBackend, SharedLayouts, CoverageSystem) {
        let layouts = SharedLayouts::new(&mut backend).unwrap();
        let coverage = CoverageSystem::new(
            2,
            DepthTargetConfig {
                resolution: 64,
                ..Default::default()
            },
        )
        .unwrap();
        (backend, layouts, coverage)
    }

    #[test]
    fn test_pipeline_follows_program_generation() {
        let (mut backend, layouts, mut coverage) = setup();
        let mut pass = CoveragePass::new([0.0; 4]);
        let scene = Scene::new();
        let resources = SceneResources::new();

        let frame = backend.begin_frame().unwrap();
        pass.render(&mut backend, &layouts, &scene, &mut coverage, &resources, &frame)
            .unwrap();
        let first = pass.pipeline.as_ref().unwrap().pipeline;

        pass.render(&mut backend, &layouts, &scene, &mut coverage, &resources, &frame)
            .unwrap();
        assert_eq!(pass.pipeline.as_ref().unwrap().pipeline, first);

        coverage.set_camera_capacity(&mut backend, 5).unwrap();
        pass.render(&mut backend, &layouts, &scene, &mut coverage, &resources, &frame)
            .unwrap();
        let rebuilt = pass.pipeline.as_ref().unwrap().pipeline;
        assert_ne!(rebuilt, first);

        let desc = backend.pipeline_descriptor(rebuilt).unwrap();
        assert_eq!(desc.cull_mode, CullMode::None);
        assert_eq!(desc.bind_group_layouts.len(), 3);
        assert!(desc.shader.contains("shadow_map_4"));
    }

    #[test]
    fn test_nearest_sampler_without_float_filtering() {
        let (mut backend, layouts, mut coverage) =
            setup_on(DummyBackend::new().with_capabilities(DeviceCapabilities {
                float32_filterable: false,
                ..Default::default()
            }));
        let mut pass = CoveragePass::new([0.0; 4]);
        let frame = backend.begin_frame().unwrap();
        pass.render(
            &mut backend,
            &layouts,
            &Scene::new(),
            &mut coverage,
            &SceneResources::new(),
            &frame,
        )
        .unwrap();

        let (sampler, filterable) = pass.sampler.unwrap();
        assert!(!filterable);
        assert_eq!(
            backend.sampler_descriptor(sampler).unwrap().mag_filter,
            FilterMode::Nearest
        );
        let desc = backend
            .pipeline_descriptor(pass.pipeline.as_ref().unwrap().pipeline)
            .unwrap();
        assert_eq!(desc.bind_group_layouts.len(), 3);
    }

    #[test]
    fn test_linear_sampler_with_float_filtering() {
        let (mut backend, layouts, mut coverage) = setup();
        assert!(backend.capabilities().float32_filterable);
        let mut pass = CoveragePass::new([0.0; 4]);
        let frame = backend.begin_frame().unwrap();
        pass.render(
            &mut backend,
            &layouts,
            &Scene::new(),
            &mut coverage,
            &SceneResources::new(),
            &frame,
        )
        .unwrap();

        let (sampler, filterable) = pass.sampler.unwrap();
        assert!(filterable);
        assert_eq!(
            backend.sampler_descriptor(sampler).unwrap().mag_filter,
            FilterMode::Linear
        );
    }

    #[test]
    fn test_screen_depth_follows_frame_size() {
        let (mut backend, layouts, mut coverage) = setup();
        let mut pass = CoveragePass::new([0.0; 4]);
        let scene = Scene::new();
        let resources = SceneResources::new();

        let frame = backend.begin_frame().unwrap();
        pass.render(&mut backend, &layouts, &scene, &mut coverage, &resources, &frame)
            .unwrap();
        let textures = backend.live_texture_count();

        backend.resize(320, 200);
        let frame = backend.begin_frame().unwrap();
        pass.render(&mut backend, &layouts, &scene, &mut coverage, &resources, &frame)
            .unwrap();
        assert_eq!(backend.live_texture_count(), textures);

        let depth = pass.depth.as_ref().unwrap();
        assert_eq!(depth.size, (320, 200));
        assert!(backend.commands().contains(&RecordedCommand::SetViewport {
            width: 320.0,
            height: 200.0
        }));
    }
}
