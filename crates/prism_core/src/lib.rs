pub use glam;

pub mod camera;
pub mod config;
pub mod scheduler;
pub mod time;
pub mod transform;

pub use camera::{Camera, CameraUniforms, OrbitRig};
pub use config::{
    BloomSettings, ConfigEffect, ConfigError, GBufferPacking, PipelineKind, RuntimeConfig,
    apply_config,
};
pub use scheduler::{FrameScheduler, FrameStats, FrameTick, SchedulerState};
pub use time::{LightClock, Time};
pub use transform::Transform;

/// Size of the pre-allocated light pool.
pub const MAX_LIGHTS: u32 = 5000;

/// Light count used when no configuration overrides it.
pub const DEFAULT_LIGHT_COUNT: u32 = 500;
