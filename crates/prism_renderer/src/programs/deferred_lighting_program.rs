use prism_core::GBufferPacking;
use wgpu::RenderPipeline;

use crate::{
    RenderError,
    gbuffer,
    global_resources::SharedLayouts,
    programs::{DrawEncoder, GpuProgram, GpuProgramRenderContext, fullscreen_pipeline},
    shaders,
};

/// Fullscreen lighting pass of the deferred variant. Owns the layout the G-buffer
/// bind group is created against, since that layout depends on the packing.
pub struct DeferredLightingProgram {
    pipeline: RenderPipeline,
    pub gbuffer_layout: wgpu::BindGroupLayout,
}

impl GpuProgram for DeferredLightingProgram {
    type InitData = (SharedLayouts, GBufferPacking);
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Scene - Group 0
        &'a wgpu::BindGroup, // GBuffer textures - Group 1
        &'a wgpu::BindGroup, // Clusters - Group 2
    );

    fn new(ctx: &GpuProgramRenderContext, init_data: &Self::InitData) -> Result<Self, RenderError> {
        let (layouts, packing) = init_data;
        let name = match packing {
            GBufferPacking::MultiAttachment => shaders::DEFERRED_MULTI,
            GBufferPacking::Packed => shaders::DEFERRED_PACKED,
        };
        let shader = ctx.shaders.create_module(ctx.device, name)?;
        let gbuffer_layout = gbuffer::read_layout(ctx.device, *packing);

        let pipeline = fullscreen_pipeline(
            ctx,
            "Deferred Lighting Pipeline",
            &shader,
            &[&layouts.scene, &gbuffer_layout, &layouts.clusters],
        );

        Ok(Self {
            pipeline,
            gbuffer_layout,
        })
    }

    fn record<'a, E: DrawEncoder<'a>>(&'a self, encoder: &mut E, data: Self::DrawData<'a>) {
        let (scene_bind_group, gbuffer_bind_group, cluster_bind_group) = data;

        encoder.set_pipeline(&self.pipeline);
        encoder.set_bind_group(0, scene_bind_group);
        encoder.set_bind_group(1, gbuffer_bind_group);
        encoder.set_bind_group(2, cluster_bind_group);
        encoder.draw(0..3, 0..1);
    }
}
