pub mod deferred_lighting_program;
pub mod forward_plus_program;
pub mod gbuffer_program;
pub mod naive_program;

use std::ops::Range;

pub use deferred_lighting_program::DeferredLightingProgram;
pub use forward_plus_program::ForwardPlusProgram;
pub use gbuffer_program::GBufferProgram;
pub use naive_program::NaiveProgram;

use crate::{RenderError, mesh::Vertex, scene::Scene, shaders::ShaderLibrary, texture::TextureHelper};

/// Holds common WGPU references to simplify function signatures.
pub struct GpuProgramRenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub shaders: &'a ShaderLibrary,
    pub format: wgpu::TextureFormat, // The output format (HDR color target)
}

pub trait GpuProgram: Sized {
    /// Data required to initialize the pipeline (e.g., shared layouts)
    type InitData;

    /// Data required to draw a frame (e.g., bind groups, the scene)
    type DrawData<'a>
    where
        Self: 'a;

    /// 1. INIT: Compiles shaders, creates pipeline layouts and the pipeline itself.
    fn new(ctx: &GpuProgramRenderContext, init_data: &Self::InitData) -> Result<Self, RenderError>;

    /// 2. RECORD: Encodes commands into a render pass or a render bundle.
    fn record<'a, E: DrawEncoder<'a>>(&'a self, encoder: &mut E, data: Self::DrawData<'a>);
}

/// The subset of draw commands shared by `RenderPass` and `RenderBundleEncoder`,
/// so a program records the same way live or into a replayable bundle.
pub trait DrawEncoder<'a> {
    fn set_pipeline(&mut self, pipeline: &'a wgpu::RenderPipeline);
    fn set_bind_group(&mut self, index: u32, bind_group: &'a wgpu::BindGroup);
    fn set_vertex_buffer(&mut self, slot: u32, slice: wgpu::BufferSlice<'a>);
    fn set_index_buffer(&mut self, slice: wgpu::BufferSlice<'a>, format: wgpu::IndexFormat);
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

impl<'a> DrawEncoder<'a> for wgpu::RenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: &'a wgpu::RenderPipeline) {
        wgpu::RenderPass::set_pipeline(self, pipeline);
    }

    fn set_bind_group(&mut self, index: u32, bind_group: &'a wgpu::BindGroup) {
        wgpu::RenderPass::set_bind_group(self, index, bind_group, &[]);
    }

    fn set_vertex_buffer(&mut self, slot: u32, slice: wgpu::BufferSlice<'a>) {
        wgpu::RenderPass::set_vertex_buffer(self, slot, slice);
    }

    fn set_index_buffer(&mut self, slice: wgpu::BufferSlice<'a>, format: wgpu::IndexFormat) {
        wgpu::RenderPass::set_index_buffer(self, slice, format);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        wgpu::RenderPass::draw(self, vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        wgpu::RenderPass::draw_indexed(self, indices, base_vertex, instances);
    }
}

impl<'a> DrawEncoder<'a> for wgpu::RenderBundleEncoder<'a> {
    fn set_pipeline(&mut self, pipeline: &'a wgpu::RenderPipeline) {
        wgpu::RenderBundleEncoder::set_pipeline(self, pipeline);
    }

    fn set_bind_group(&mut self, index: u32, bind_group: &'a wgpu::BindGroup) {
        wgpu::RenderBundleEncoder::set_bind_group(self, index, bind_group, &[]);
    }

    fn set_vertex_buffer(&mut self, slot: u32, slice: wgpu::BufferSlice<'a>) {
        wgpu::RenderBundleEncoder::set_vertex_buffer(self, slot, slice);
    }

    fn set_index_buffer(&mut self, slice: wgpu::BufferSlice<'a>, format: wgpu::IndexFormat) {
        wgpu::RenderBundleEncoder::set_index_buffer(self, slice, format);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        wgpu::RenderBundleEncoder::draw(self, vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        wgpu::RenderBundleEncoder::draw_indexed(self, indices, base_vertex, instances);
    }
}

/// Binds groups 1 and 2 per draw call and issues the indexed draws. The caller has
/// already set the pipeline, group 0 and any variant-specific groups.
pub fn record_scene<'a, E: DrawEncoder<'a>>(encoder: &mut E, scene: &'a Scene) {
    let mut current_material: Option<&wgpu::BindGroup> = None;

    for call in scene.draw_calls() {
        if !current_material.is_some_and(|m| std::ptr::eq(m, call.material_bind_group)) {
            encoder.set_bind_group(2, call.material_bind_group);
            current_material = Some(call.material_bind_group);
        }
        encoder.set_bind_group(1, call.node_bind_group);
        encoder.set_vertex_buffer(0, call.vertex_buffer.slice(..));
        encoder.set_index_buffer(call.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        encoder.draw_indexed(0..call.index_count, 0, 0..1);
    }
}

/// Pipeline for passes that rasterize scene geometry with the fixed vertex layout.
pub(crate) fn geometry_pipeline(
    ctx: &GpuProgramRenderContext,
    label: &str,
    shader: &wgpu::ShaderModule,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    targets: &[Option<wgpu::ColorTargetState>],
) -> wgpu::RenderPipeline {
    let layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

    ctx.device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some(label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::desc()], // <--- Use our Vertex layout!
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets,
            }),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: TextureHelper::DEPTH_FORMAT,
                depth_write_enabled: true, // Write Z-values
                depth_compare: wgpu::CompareFunction::Less, // Closer pixels win
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
}

/// Pipeline for a fullscreen triangle with no vertex buffers and no depth.
pub(crate) fn fullscreen_pipeline(
    ctx: &GpuProgramRenderContext,
    label: &str,
    shader: &wgpu::ShaderModule,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::RenderPipeline {
    let layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

    ctx.device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some(label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_fullscreen"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState::default(),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
}
