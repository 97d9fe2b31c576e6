use glam::Mat4;
use prism_core::{BloomSettings, Camera, ConfigEffect, PipelineKind, RuntimeConfig};

use crate::{
    RenderError,
    bloom::BloomChain,
    context::GraphicsContext,
    global_resources::{GlobalResources, SharedLayouts},
    light::LightStore,
    present::PresentPass,
    scene::{Scene, SceneDescription},
    shaders::ShaderLibrary,
    texture::{FrameTargets, TargetExtent},
    variant::{FrameInputs, PipelineVariant, VariantShared},
};

/// Owns every GPU resource of the running renderer and encodes one frame per
/// [`Renderer::render`] call.
pub struct Renderer {
    context: GraphicsContext,
    shaders: ShaderLibrary,
    layouts: SharedLayouts,

    lights: LightStore,
    globals: GlobalResources,
    scene: Scene,
    camera: Camera,

    targets: FrameTargets,
    variant: Option<PipelineVariant>,
    bloom: Option<BloomChain>,
    present: PresentPass,
    present_source: wgpu::BindGroup,

    config: RuntimeConfig,
}

impl Renderer {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        config: RuntimeConfig,
        scene: &SceneDescription,
    ) -> Result<Self, RenderError> {
        let config = config.sanitized();
        let context = GraphicsContext::new(target, width, height)?;
        let extent = TargetExtent::validate(
            context.config.width,
            context.config.height,
            context.max_texture_dimension(),
        )?;

        let shaders = ShaderLibrary::builtin();
        let layouts = SharedLayouts::new(&context.device);

        let mut lights = LightStore::new(&context.device, &shaders, config.active_light_count)?;
        lights.set_frozen(config.time_frozen);
        let globals = GlobalResources::new(&context.device, &layouts, &lights);
        let scene = Scene::upload(&context.device, &context.queue, &layouts, scene);
        log::info!("scene uploaded with {} drawable nodes", scene.node_count());

        let mut camera = Camera::default();
        camera.set_viewport(extent.width, extent.height);

        let targets = FrameTargets::new(&context.device, extent)?;
        let bloom = if config.bloom_enabled {
            Some(BloomChain::new(
                &context.device,
                &shaders,
                &targets.color.view,
                extent,
                &config.bloom,
            )?)
        } else {
            None
        };

        let present = PresentPass::new(&context.device, &shaders, context.surface_format())?;
        let source = match (PresentSource::for_bloom(bloom.is_some()), &bloom) {
            (PresentSource::BloomComposite, Some(bloom)) => bloom.output_view(),
            _ => &targets.color.view,
        };
        let present_source = present.bind_source(&context.device, source);

        let mut renderer = Self {
            context,
            shaders,
            layouts,
            lights,
            globals,
            scene,
            camera,
            targets,
            variant: None,
            bloom,
            present,
            present_source,
            config,
        };
        renderer.select_variant(renderer.config.pipeline)?;
        Ok(renderer)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn extent(&self) -> TargetExtent {
        self.targets.extent
    }

    pub fn active_variant(&self) -> Option<PipelineKind> {
        self.variant.as_ref().map(PipelineVariant::kind)
    }

    pub fn bloom(&self) -> Option<&BloomChain> {
        self.bloom.as_ref()
    }

    /// Drops the active variant, then builds `kind` against the current targets.
    pub fn select_variant(&mut self, kind: PipelineKind) -> Result<(), RenderError> {
        if let Some(old) = &self.variant {
            log::info!("tearing down pipeline variant {:?}", old.kind());
        }

        let shared = VariantShared {
            device: &self.context.device,
            shaders: &self.shaders,
            layouts: &self.layouts,
            extent: self.targets.extent,
        };
        let packing = self.config.gbuffer_packing;
        rebuild_in_place(&mut self.variant, || {
            PipelineVariant::initialize(kind, packing, &shared)
        })
    }

    /// Diffs `new` against the active configuration and carries out every effect.
    pub fn apply_config(&mut self, new: RuntimeConfig) -> Result<(), RenderError> {
        let new = new.sanitized();
        let effects = prism_core::apply_config(&self.config, &new);
        self.config = new;

        for action in plan_actions(effects, self.bloom.is_some()) {
            log::debug!("applying {action:?}");
            match action {
                RendererAction::SelectVariant(kind) => self.select_variant(kind)?,
                RendererAction::SetLightCount(count) => {
                    self.lights.set_active_count(&self.context.queue, count)
                }
                RendererAction::BuildBloom => {
                    self.bloom = Some(BloomChain::new(
                        &self.context.device,
                        &self.shaders,
                        &self.targets.color.view,
                        self.targets.extent,
                        &self.config.bloom,
                    )?);
                }
                RendererAction::DropBloom => {
                    log::info!("bloom disabled");
                    self.bloom = None;
                }
                RendererAction::UploadBloomSettings(settings) => {
                    if let Some(bloom) = &mut self.bloom {
                        bloom.set_settings(&self.context.queue, &settings);
                    }
                }
                RendererAction::FreezeLights(frozen) => self.lights.set_frozen(frozen),
                RendererAction::InvalidateBundles => {
                    if let Some(variant) = &mut self.variant {
                        variant.invalidate_bundles();
                    }
                }
                RendererAction::RebindPresent => self.rebind_present(),
            }
        }
        Ok(())
    }

    /// Toggles the copy of the bloom brightness and blur buffers. No-op while bloom is off.
    pub fn set_bloom_debug_copy(&mut self, enabled: bool) -> Result<(), RenderError> {
        if let Some(bloom) = &mut self.bloom {
            bloom.set_debug_copy(&self.context.device, &self.targets.color.view, enabled)?;
        }
        Ok(())
    }

    fn rebind_present(&mut self) {
        let source = match (PresentSource::for_bloom(self.bloom.is_some()), &self.bloom) {
            (PresentSource::BloomComposite, Some(bloom)) => bloom.output_view(),
            _ => &self.targets.color.view,
        };
        self.present_source = self.present.bind_source(&self.context.device, source);
    }

    /// Reallocates every size-dependent texture and rebuilds the active variant.
    /// Zero-sized requests (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {width}x{height}");
            return Ok(());
        }

        let extent = self.context.resize(width, height)?;
        self.camera.set_viewport(extent.width, extent.height);

        self.targets = FrameTargets::new(&self.context.device, extent)?;
        if let Some(bloom) = &mut self.bloom {
            bloom.resize(&self.context.device, &self.targets.color.view, extent)?;
        }
        self.rebind_present();

        let kind = self
            .variant
            .as_ref()
            .map_or(self.config.pipeline, PipelineVariant::kind);
        self.select_variant(kind)?;

        log::debug!(
            "resized to {}x{} (aspect {:.3})",
            extent.width,
            extent.height,
            self.camera.aspect_ratio
        );
        Ok(())
    }

    /// Encodes and submits one frame: light motion, cluster assignment, the active
    /// variant, bloom, then the present copy.
    pub fn render(&mut self, delta_seconds: f32, view: Mat4) -> Result<(), RenderError> {
        let output = match self.context.acquire() {
            Ok(output) => output,
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                log::warn!("surface {err}, reconfiguring and skipping the frame");
                self.context.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out, skipping the frame");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // 1. Per-frame uniforms
        let extent = self.targets.extent;
        let camera = self.camera.uniforms(view);
        self.globals.update_camera(&self.context.queue, &camera, extent);
        self.lights.advance(&self.context.queue, delta_seconds);

        let Some(variant) = self.variant.as_mut() else {
            return Ok(());
        };
        variant.update_clusters(&self.context.queue, &camera, extent);

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // 2. Compute: move lights, then cluster them
        self.lights.record_motion(&mut encoder);
        variant.record_clusters(&mut encoder, &self.globals.bind_group);

        // 3. Geometry and lighting
        variant.draw(
            &self.context.device,
            &mut encoder,
            &FrameInputs {
                targets: &self.targets,
                scene_bind_group: &self.globals.bind_group,
                scene: &self.scene,
                use_bundles: self.config.use_batched_command_replay,
            },
        );

        // 4. Post
        if let Some(bloom) = &self.bloom {
            bloom.record(&mut encoder);
        }
        self.present
            .record(&mut encoder, &surface_view, &self.present_source);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

/// Drops whatever `slot` holds before `build` runs, so the old and new resources
/// never coexist. On failure the slot stays empty.
fn rebuild_in_place<T, E>(
    slot: &mut Option<T>,
    build: impl FnOnce() -> Result<T, E>,
) -> Result<(), E> {
    drop(slot.take());
    *slot = Some(build()?);
    Ok(())
}

/// Texture the present pass copies to the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PresentSource {
    ColorPass,
    BloomComposite,
}

impl PresentSource {
    fn for_bloom(bloom_active: bool) -> Self {
        if bloom_active {
            PresentSource::BloomComposite
        } else {
            PresentSource::ColorPass
        }
    }
}

/// One step the renderer performs while applying a configuration edit.
#[derive(Clone, Debug, PartialEq)]
enum RendererAction {
    SelectVariant(PipelineKind),
    SetLightCount(u32),
    BuildBloom,
    DropBloom,
    UploadBloomSettings(BloomSettings),
    FreezeLights(bool),
    InvalidateBundles,
    RebindPresent,
}

/// Orders the renderer work for a config diff. `bloom_active` is whether a bloom
/// chain exists before the edit.
fn plan_actions(
    effects: impl IntoIterator<Item = ConfigEffect>,
    mut bloom_active: bool,
) -> Vec<RendererAction> {
    let mut actions = Vec::new();
    let mut bloom_built = false;

    for effect in effects {
        match effect {
            ConfigEffect::RebuildVariant(kind) => actions.push(RendererAction::SelectVariant(kind)),
            ConfigEffect::SetLightCount(count) => actions.push(RendererAction::SetLightCount(count)),
            ConfigEffect::SetBloomEnabled(enabled) if enabled != bloom_active => {
                actions.push(if enabled {
                    RendererAction::BuildBloom
                } else {
                    RendererAction::DropBloom
                });
                actions.push(RendererAction::RebindPresent);
                bloom_active = enabled;
                bloom_built = enabled;
            }
            ConfigEffect::SetBloomEnabled(_) => {}
            // A freshly built chain already carries the new settings
            ConfigEffect::ReconfigureBloom(settings) if bloom_active && !bloom_built => {
                actions.push(RendererAction::UploadBloomSettings(settings))
            }
            ConfigEffect::ReconfigureBloom(_) => {}
            ConfigEffect::FreezeLights(frozen) => actions.push(RendererAction::FreezeLights(frozen)),
            ConfigEffect::InvalidateCommandBundles => {
                actions.push(RendererAction::InvalidateBundles)
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use prism_core::{GBufferPacking, apply_config};

    use super::*;

    fn plan(old: &RuntimeConfig, new: &RuntimeConfig, bloom_active: bool) -> Vec<RendererAction> {
        plan_actions(apply_config(old, new), bloom_active)
    }

    #[test]
    fn disabling_bloom_presents_the_color_pass() {
        let old = RuntimeConfig {
            bloom_enabled: true,
            ..Default::default()
        };
        let new = RuntimeConfig {
            bloom_enabled: false,
            ..old.clone()
        };

        assert_eq!(
            plan(&old, &new, true),
            vec![RendererAction::DropBloom, RendererAction::RebindPresent]
        );
        assert_eq!(PresentSource::for_bloom(false), PresentSource::ColorPass);
        assert_eq!(PresentSource::for_bloom(true), PresentSource::BloomComposite);
    }

    #[test]
    fn enabling_bloom_builds_with_the_new_settings() {
        let old = RuntimeConfig {
            bloom_enabled: false,
            ..Default::default()
        };
        let mut new = RuntimeConfig {
            bloom_enabled: true,
            ..old.clone()
        };
        new.bloom.threshold = 2.5;

        assert_eq!(
            plan(&old, &new, false),
            vec![RendererAction::BuildBloom, RendererAction::RebindPresent]
        );
    }

    #[test]
    fn bloom_settings_upload_only_to_a_live_chain() {
        let old = RuntimeConfig::default();
        let mut new = old.clone();
        new.bloom.intensity = 1.25;

        assert_eq!(
            plan(&old, &new, true),
            vec![RendererAction::UploadBloomSettings(new.bloom.clone())]
        );
        assert!(plan(&old, &new, false).is_empty());
    }

    #[test]
    fn every_config_field_reaches_the_renderer() {
        let old = RuntimeConfig::default();
        let new = RuntimeConfig {
            pipeline: PipelineKind::ClusteredDeferred,
            gbuffer_packing: GBufferPacking::Packed,
            active_light_count: 1200,
            time_frozen: !old.time_frozen,
            use_batched_command_replay: !old.use_batched_command_replay,
            ..old.clone()
        };

        assert_eq!(
            plan(&old, &new, old.bloom_enabled),
            vec![
                RendererAction::SelectVariant(PipelineKind::ClusteredDeferred),
                RendererAction::SetLightCount(1200),
                RendererAction::FreezeLights(!old.time_frozen),
                RendererAction::InvalidateBundles,
            ]
        );
    }

    #[test]
    fn replay_toggle_only_invalidates_bundles() {
        let old = RuntimeConfig::default();
        let new = RuntimeConfig {
            use_batched_command_replay: !old.use_batched_command_replay,
            ..old.clone()
        };
        assert_eq!(plan(&old, &new, true), vec![RendererAction::InvalidateBundles]);
    }

    struct Tracked {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.name));
        }
    }

    #[test]
    fn rebuild_releases_the_old_value_before_building() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slot = Some(Tracked {
            name: "naive",
            log: log.clone(),
        });

        rebuild_in_place(&mut slot, || {
            log.borrow_mut().push("build forward-plus".to_string());
            Ok::<_, ()>(Tracked {
                name: "forward-plus",
                log: log.clone(),
            })
        })
        .unwrap();

        assert_eq!(*log.borrow(), ["drop naive", "build forward-plus"]);
        assert_eq!(slot.as_ref().map(|t| t.name), Some("forward-plus"));
    }

    #[test]
    fn failed_rebuild_leaves_nothing_stale() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut slot = Some(Tracked {
            name: "deferred",
            log: log.clone(),
        });

        let result = rebuild_in_place(&mut slot, || Err::<Tracked, _>("allocation failed"));

        assert_eq!(result.err(), Some("allocation failed"));
        assert!(slot.is_none());
        assert_eq!(*log.borrow(), ["drop deferred"]);
    }
}
