//! The closed set of pipeline variants.
//!
//! Each variant owns everything it draws with: programs, its cluster grid,
//! size-dependent G-buffer textures and the optional pre-recorded bundle of its
//! geometry pass. Switching variants drops the whole value before the next one
//! is built, so nothing is shared or reused across a switch.

use prism_core::{CameraUniforms, GBufferPacking, PipelineKind};

use crate::{
    CLEAR_COLOR, HDR_FORMAT, RenderError,
    cluster::{ClusterGrid, ClusterGridConfig},
    gbuffer::{self, GBuffer},
    global_resources::SharedLayouts,
    programs::{
        DeferredLightingProgram, ForwardPlusProgram, GBufferProgram, GpuProgram,
        GpuProgramRenderContext, NaiveProgram,
    },
    scene::Scene,
    shaders::ShaderLibrary,
    texture::{FrameTargets, TargetExtent, TextureHelper},
};

/// What a variant needs to build itself.
pub struct VariantShared<'a> {
    pub device: &'a wgpu::Device,
    pub shaders: &'a ShaderLibrary,
    pub layouts: &'a SharedLayouts,
    pub extent: TargetExtent,
}

/// Per-frame inputs of [`PipelineVariant::draw`].
pub struct FrameInputs<'a> {
    pub targets: &'a FrameTargets,
    pub scene_bind_group: &'a wgpu::BindGroup,
    pub scene: &'a Scene,
    /// Replay the pre-recorded geometry bundle instead of re-encoding.
    pub use_bundles: bool,
}

pub struct NaiveVariant {
    program: NaiveProgram,
    bundle: Option<wgpu::RenderBundle>,
}

pub struct ForwardPlusVariant {
    program: ForwardPlusProgram,
    grid: ClusterGrid,
    bundle: Option<wgpu::RenderBundle>,
}

pub struct DeferredVariant {
    gbuffer_program: GBufferProgram,
    lighting_program: DeferredLightingProgram,
    grid: ClusterGrid,
    gbuffer: GBuffer,
    bundle: Option<wgpu::RenderBundle>,
}

pub enum PipelineVariant {
    Naive(NaiveVariant),
    ForwardPlus(ForwardPlusVariant),
    ClusteredDeferred(DeferredVariant),
}

impl PipelineVariant {
    pub fn initialize(
        kind: PipelineKind,
        packing: GBufferPacking,
        shared: &VariantShared,
    ) -> Result<Self, RenderError> {
        let ctx = GpuProgramRenderContext {
            device: shared.device,
            shaders: shared.shaders,
            format: HDR_FORMAT,
        };

        let variant = match kind {
            PipelineKind::Naive => PipelineVariant::Naive(NaiveVariant {
                program: NaiveProgram::new(&ctx, shared.layouts)?,
                bundle: None,
            }),
            PipelineKind::ForwardPlus => PipelineVariant::ForwardPlus(ForwardPlusVariant {
                program: ForwardPlusProgram::new(&ctx, shared.layouts)?,
                grid: ClusterGrid::new(
                    shared.device,
                    shared.shaders,
                    shared.layouts,
                    ClusterGridConfig::FORWARD_PLUS,
                )?,
                bundle: None,
            }),
            PipelineKind::ClusteredDeferred => {
                let init = (shared.layouts.clone(), packing);
                let lighting_program = DeferredLightingProgram::new(&ctx, &init)?;
                let gbuffer = GBuffer::new(
                    shared.device,
                    packing,
                    shared.extent,
                    &lighting_program.gbuffer_layout,
                )?;
                PipelineVariant::ClusteredDeferred(DeferredVariant {
                    gbuffer_program: GBufferProgram::new(&ctx, &init)?,
                    lighting_program,
                    grid: ClusterGrid::new(
                        shared.device,
                        shared.shaders,
                        shared.layouts,
                        ClusterGridConfig::DEFERRED,
                    )?,
                    gbuffer,
                    bundle: None,
                })
            }
        };

        log::info!(
            "pipeline variant {:?} built at {}x{}",
            kind,
            shared.extent.width,
            shared.extent.height
        );
        Ok(variant)
    }

    pub fn kind(&self) -> PipelineKind {
        match self {
            PipelineVariant::Naive(_) => PipelineKind::Naive,
            PipelineVariant::ForwardPlus(_) => PipelineKind::ForwardPlus,
            PipelineVariant::ClusteredDeferred(_) => PipelineKind::ClusteredDeferred,
        }
    }

    /// G-buffer encoding, for the deferred variant only.
    pub fn packing(&self) -> Option<GBufferPacking> {
        match self {
            PipelineVariant::ClusteredDeferred(v) => Some(v.gbuffer_program.packing()),
            _ => None,
        }
    }

    pub fn cluster_grid(&self) -> Option<&ClusterGrid> {
        match self {
            PipelineVariant::Naive(_) => None,
            PipelineVariant::ForwardPlus(v) => Some(&v.grid),
            PipelineVariant::ClusteredDeferred(v) => Some(&v.grid),
        }
    }

    pub fn update_clusters(&self, queue: &wgpu::Queue, camera: &CameraUniforms, extent: TargetExtent) {
        if let Some(grid) = self.cluster_grid() {
            grid.update(queue, camera, extent);
        }
    }

    /// Encodes the cluster assignment. Must precede [`Self::draw`] in the same encoder.
    pub fn record_clusters(&self, encoder: &mut wgpu::CommandEncoder, scene_bind_group: &wgpu::BindGroup) {
        if let Some(grid) = self.cluster_grid() {
            grid.record(encoder, scene_bind_group);
        }
    }

    /// Drops recorded bundles; the next bundled frame records them again.
    pub fn invalidate_bundles(&mut self) {
        let bundle = match self {
            PipelineVariant::Naive(v) => &mut v.bundle,
            PipelineVariant::ForwardPlus(v) => &mut v.bundle,
            PipelineVariant::ClusteredDeferred(v) => &mut v.bundle,
        };
        if bundle.take().is_some() {
            log::debug!("{:?} command bundle invalidated", self.kind());
        }
    }

    /// Geometry and lighting passes into the HDR color target.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameInputs,
    ) {
        match self {
            PipelineVariant::Naive(v) => {
                let data = (frame.scene_bind_group, frame.scene);
                let bundle = if frame.use_bundles {
                    Some(&*v.bundle.get_or_insert_with(|| {
                        record_bundle(device, "Naive Bundle", &[Some(HDR_FORMAT)], |bundle| {
                            v.program.record(bundle, data)
                        })
                    }))
                } else {
                    None
                };
                let mut pass = color_pass(encoder, "Naive Forward Pass", frame.targets);
                match bundle {
                    Some(bundle) => pass.execute_bundles(std::iter::once(bundle)),
                    None => v.program.record(&mut pass, data),
                }
            }
            PipelineVariant::ForwardPlus(v) => {
                let data = (
                    frame.scene_bind_group,
                    v.grid.shading_bind_group(),
                    frame.scene,
                );
                let bundle = if frame.use_bundles {
                    Some(&*v.bundle.get_or_insert_with(|| {
                        record_bundle(device, "Forward+ Bundle", &[Some(HDR_FORMAT)], |bundle| {
                            v.program.record(bundle, data)
                        })
                    }))
                } else {
                    None
                };
                let mut pass = color_pass(encoder, "Forward+ Pass", frame.targets);
                match bundle {
                    Some(bundle) => pass.execute_bundles(std::iter::once(bundle)),
                    None => v.program.record(&mut pass, data),
                }
            }
            PipelineVariant::ClusteredDeferred(v) => {
                // 1. Geometry into the G-buffer
                let data = (frame.scene_bind_group, frame.scene);
                let formats: Vec<_> = gbuffer::formats(v.gbuffer.packing())
                    .iter()
                    .map(|&format| Some(format))
                    .collect();
                let bundle = if frame.use_bundles {
                    Some(&*v.bundle.get_or_insert_with(|| {
                        record_bundle(device, "GBuffer Bundle", &formats, |bundle| {
                            v.gbuffer_program.record(bundle, data)
                        })
                    }))
                } else {
                    None
                };
                {
                    let attachments = v.gbuffer.color_attachments();
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("GBuffer Pass"),
                        color_attachments: &attachments,
                        depth_stencil_attachment: Some(depth_attachment(frame.targets)),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    match bundle {
                        Some(bundle) => pass.execute_bundles(std::iter::once(bundle)),
                        None => v.gbuffer_program.record(&mut pass, data),
                    }
                }

                // 2. Fullscreen clustered lighting
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Deferred Lighting Pass"),
                    color_attachments: &[Some(color_attachment(frame.targets))],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                v.lighting_program.record(
                    &mut pass,
                    (
                        frame.scene_bind_group,
                        v.gbuffer.read_bind_group(),
                        v.grid.shading_bind_group(),
                    ),
                );
            }
        }
    }
}

fn record_bundle<'a>(
    device: &wgpu::Device,
    label: &str,
    color_formats: &[Option<wgpu::TextureFormat>],
    record: impl FnOnce(&mut wgpu::RenderBundleEncoder<'a>),
) -> wgpu::RenderBundle {
    let mut encoder = device.create_render_bundle_encoder(&wgpu::RenderBundleEncoderDescriptor {
        label: Some(label),
        color_formats,
        depth_stencil: Some(wgpu::RenderBundleDepthStencil {
            format: TextureHelper::DEPTH_FORMAT,
            depth_read_only: false,
            stencil_read_only: true,
        }),
        sample_count: 1,
        multiview: None,
    });
    record(&mut encoder);
    log::debug!("recorded command bundle '{label}'");
    encoder.finish(&wgpu::RenderBundleDescriptor { label: Some(label) })
}

fn color_attachment(targets: &FrameTargets) -> wgpu::RenderPassColorAttachment<'_> {
    let [r, g, b, a] = CLEAR_COLOR.map(f64::from);
    wgpu::RenderPassColorAttachment {
        view: &targets.color.view,
        resolve_target: None,
        depth_slice: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
            store: wgpu::StoreOp::Store,
        },
    }
}

fn depth_attachment(targets: &FrameTargets) -> wgpu::RenderPassDepthStencilAttachment<'_> {
    wgpu::RenderPassDepthStencilAttachment {
        view: &targets.depth.view,
        depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0), // Clear to "Far" (1.0)
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    }
}

/// Forward pass into the HDR target with depth.
fn color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    targets: &FrameTargets,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(color_attachment(targets))],
        depth_stencil_attachment: Some(depth_attachment(targets)),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}
