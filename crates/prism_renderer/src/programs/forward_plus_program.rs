use wgpu::RenderPipeline;

use crate::{
    RenderError,
    global_resources::SharedLayouts,
    programs::{DrawEncoder, GpuProgram, GpuProgramRenderContext, geometry_pipeline, record_scene},
    scene::Scene,
    shaders,
};

/// Forward shading restricted to the lights listed in the fragment's cluster.
pub struct ForwardPlusProgram {
    pipeline: RenderPipeline,
}

impl GpuProgram for ForwardPlusProgram {
    type InitData = SharedLayouts;
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Scene - Group 0
        &'a wgpu::BindGroup, // Clusters + grid params - Group 3
        &'a Scene,           // Group 1 & 2
    );

    fn new(ctx: &GpuProgramRenderContext, layouts: &Self::InitData) -> Result<Self, RenderError> {
        let shader = ctx.shaders.create_module(ctx.device, shaders::FORWARD_PLUS)?;

        let pipeline = geometry_pipeline(
            ctx,
            "Forward+ Pipeline",
            &shader,
            &[
                &layouts.scene,
                &layouts.node,
                &layouts.material,
                &layouts.clusters,
            ],
            &[Some(wgpu::ColorTargetState {
                format: ctx.format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        );

        Ok(Self { pipeline })
    }

    fn record<'a, E: DrawEncoder<'a>>(&'a self, encoder: &mut E, data: Self::DrawData<'a>) {
        let (scene_bind_group, cluster_bind_group, scene) = data;

        encoder.set_pipeline(&self.pipeline);
        encoder.set_bind_group(0, scene_bind_group);
        encoder.set_bind_group(3, cluster_bind_group);
        record_scene(encoder, scene);
    }
}
