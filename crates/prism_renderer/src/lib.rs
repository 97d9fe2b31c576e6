pub mod bloom;
pub mod cluster;
pub mod context;
pub mod gbuffer;
pub mod global_resources;
pub mod light;
pub mod material;
pub mod mesh;
pub mod present;
pub mod programs;
pub mod reference;
mod render;
pub mod scene;
pub mod shaders;
pub mod texture;
pub mod variant;

pub use context::GraphicsContext;
pub use render::Renderer;
pub use scene::{NodeDescription, Scene, SceneDescription};

/// Format of the HDR color pass every variant renders into.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Background written wherever no geometry covers the pixel.
pub const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter found: {0}")]
    AdapterUnavailable(String),
    #[error("failed to open GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("failed to create window surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    #[error("failed to acquire surface texture: {0}")]
    SurfaceAcquire(#[from] wgpu::SurfaceError),
    #[error("render target must be non-zero, got {width}x{height}")]
    ZeroSizedTarget { width: u32, height: u32 },
    #[error("render target {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("GPU allocation failed for {label}: {message}")]
    Allocation { label: String, message: String },
    #[error("unknown shader program '{0}'")]
    UnknownShader(String),
}
