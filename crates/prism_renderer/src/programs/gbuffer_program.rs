use prism_core::GBufferPacking;
use wgpu::RenderPipeline;

use crate::{
    RenderError,
    gbuffer,
    global_resources::SharedLayouts,
    programs::{DrawEncoder, GpuProgram, GpuProgramRenderContext, geometry_pipeline, record_scene},
    scene::Scene,
    shaders,
};

/// Geometry pass of the deferred variant: rasterizes the scene into the G-buffer.
pub struct GBufferProgram {
    pipeline: RenderPipeline,
    packing: GBufferPacking,
}

impl GBufferProgram {
    pub fn packing(&self) -> GBufferPacking {
        self.packing
    }
}

impl GpuProgram for GBufferProgram {
    type InitData = (SharedLayouts, GBufferPacking);
    type DrawData<'a> = (&'a wgpu::BindGroup, &'a Scene);

    fn new(ctx: &GpuProgramRenderContext, init_data: &Self::InitData) -> Result<Self, RenderError> {
        let (layouts, packing) = init_data;
        let name = match packing {
            GBufferPacking::MultiAttachment => shaders::GBUFFER_MULTI,
            GBufferPacking::Packed => shaders::GBUFFER_PACKED,
        };
        let shader = ctx.shaders.create_module(ctx.device, name)?;

        let pipeline = geometry_pipeline(
            ctx,
            "GBuffer Pipeline",
            &shader,
            &[&layouts.scene, &layouts.node, &layouts.material],
            &gbuffer::color_targets(*packing),
        );

        Ok(Self {
            pipeline,
            packing: *packing,
        })
    }

    fn record<'a, E: DrawEncoder<'a>>(&'a self, encoder: &mut E, data: Self::DrawData<'a>) {
        let (scene_bind_group, scene) = data;

        encoder.set_pipeline(&self.pipeline);
        encoder.set_bind_group(0, scene_bind_group);
        record_scene(encoder, scene);
    }
}
