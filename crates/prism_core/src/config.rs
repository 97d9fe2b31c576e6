//! Runtime configuration and the diff that turns edits into renderer side effects.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::MAX_LIGHTS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// End-to-end rendering strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// One forward pass, every light evaluated per fragment.
    Naive,
    /// One forward pass reading the fragment's cluster light list.
    #[default]
    ForwardPlus,
    /// G-buffer pass followed by a fullscreen clustered lighting pass.
    ClusteredDeferred,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::Naive,
        PipelineKind::ForwardPlus,
        PipelineKind::ClusteredDeferred,
    ];

    /// Cycles through the variants in declaration order.
    pub fn next(self) -> Self {
        match self {
            PipelineKind::Naive => PipelineKind::ForwardPlus,
            PipelineKind::ForwardPlus => PipelineKind::ClusteredDeferred,
            PipelineKind::ClusteredDeferred => PipelineKind::Naive,
        }
    }
}

/// Geometry-pass output encoding for the deferred variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GBufferPacking {
    /// Albedo, normal and view-space position in three render targets.
    #[default]
    MultiAttachment,
    /// One 4x32-bit unsigned texture; position rebuilt from depth.
    Packed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Luminance above which a pixel feeds the bloom.
    pub threshold: f32,
    /// Scale applied to the blurred brightness before compositing.
    pub intensity: f32,
    /// K: the blur runs 2*K separable passes.
    pub blur_iterations: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            intensity: 0.6,
            blur_iterations: 4,
        }
    }
}

impl BloomSettings {
    pub const MAX_BLUR_ITERATIONS: u32 = 16;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub active_light_count: u32,
    pub pipeline: PipelineKind,
    pub gbuffer_packing: GBufferPacking,
    pub bloom_enabled: bool,
    pub bloom: BloomSettings,
    /// Freezes light motion only; the camera keeps moving.
    pub time_frozen: bool,
    /// Replay pre-recorded draw bundles instead of re-encoding every frame.
    pub use_batched_command_replay: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            active_light_count: crate::DEFAULT_LIGHT_COUNT,
            pipeline: PipelineKind::default(),
            gbuffer_packing: GBufferPacking::default(),
            bloom_enabled: false,
            bloom: BloomSettings::default(),
            time_frozen: false,
            use_batched_command_replay: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Clamps every field into its valid range. Out-of-range values are never an error.
    pub fn sanitized(mut self) -> Self {
        let clamped = self.active_light_count.clamp(1, MAX_LIGHTS);
        if clamped != self.active_light_count {
            log::warn!(
                "active light count {} out of range, clamped to {}",
                self.active_light_count,
                clamped
            );
            self.active_light_count = clamped;
        }

        self.bloom.blur_iterations = self
            .bloom
            .blur_iterations
            .clamp(1, BloomSettings::MAX_BLUR_ITERATIONS);
        if !self.bloom.threshold.is_finite() || self.bloom.threshold < 0.0 {
            self.bloom.threshold = 0.0;
        }
        if !self.bloom.intensity.is_finite() || self.bloom.intensity < 0.0 {
            self.bloom.intensity = 0.0;
        }
        self
    }
}

/// One side effect a configuration edit requires from the renderer.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigEffect {
    /// Tear the active variant down completely and build a fresh one.
    RebuildVariant(PipelineKind),
    SetLightCount(u32),
    SetBloomEnabled(bool),
    /// Bloom parameters changed; upload new settings.
    ReconfigureBloom(BloomSettings),
    FreezeLights(bool),
    /// Pre-recorded command bundles are stale (or replay was switched on/off).
    InvalidateCommandBundles,
}

/// Diffs two configurations field by field.
///
/// Both inputs are sanitized first, so the effects always carry valid values.
pub fn apply_config(old: &RuntimeConfig, new: &RuntimeConfig) -> Vec<ConfigEffect> {
    let old = old.clone().sanitized();
    let new = new.clone().sanitized();
    let mut effects = Vec::new();

    let packing_matters = new.pipeline == PipelineKind::ClusteredDeferred;
    if old.pipeline != new.pipeline
        || (packing_matters && old.gbuffer_packing != new.gbuffer_packing)
    {
        effects.push(ConfigEffect::RebuildVariant(new.pipeline));
    }

    if old.active_light_count != new.active_light_count {
        effects.push(ConfigEffect::SetLightCount(new.active_light_count));
    }

    if old.bloom_enabled != new.bloom_enabled {
        effects.push(ConfigEffect::SetBloomEnabled(new.bloom_enabled));
    }

    if old.bloom != new.bloom {
        effects.push(ConfigEffect::ReconfigureBloom(new.bloom.clone()));
    }

    if old.time_frozen != new.time_frozen {
        effects.push(ConfigEffect::FreezeLights(new.time_frozen));
    }

    let rebuilds = effects
        .iter()
        .any(|e| matches!(e, ConfigEffect::RebuildVariant(_)));
    if rebuilds || old.use_batched_command_replay != new.use_batched_command_replay {
        effects.push(ConfigEffect::InvalidateCommandBundles);
    }

    effects
}
