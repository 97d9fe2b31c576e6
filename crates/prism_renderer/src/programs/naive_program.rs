use wgpu::RenderPipeline;

use crate::{
    RenderError,
    global_resources::SharedLayouts,
    programs::{DrawEncoder, GpuProgram, GpuProgramRenderContext, geometry_pipeline, record_scene},
    scene::Scene,
    shaders,
};

/// Forward shading that loops over every active light per fragment.
pub struct NaiveProgram {
    pipeline: RenderPipeline,
}

impl GpuProgram for NaiveProgram {
    type InitData = SharedLayouts;
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Scene (Camera/Lights) - Group 0
        &'a Scene,           // Nodes and materials - Group 1 & 2
    );

    fn new(ctx: &GpuProgramRenderContext, layouts: &Self::InitData) -> Result<Self, RenderError> {
        let shader = ctx.shaders.create_module(ctx.device, shaders::NAIVE)?;

        let pipeline = geometry_pipeline(
            ctx,
            "Naive Forward Pipeline",
            &shader,
            &[&layouts.scene, &layouts.node, &layouts.material],
            &[Some(wgpu::ColorTargetState {
                format: ctx.format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        );

        Ok(Self { pipeline })
    }

    fn record<'a, E: DrawEncoder<'a>>(&'a self, encoder: &mut E, data: Self::DrawData<'a>) {
        let (scene_bind_group, scene) = data;

        encoder.set_pipeline(&self.pipeline);
        encoder.set_bind_group(0, scene_bind_group);
        record_scene(encoder, scene);
    }
}
