use wgpu::{Device, Queue, Surface, SurfaceConfiguration};

use crate::{RenderError, texture::TargetExtent};

/// The GPU connection: device, queue and the configured window surface.
pub struct GraphicsContext {
    pub device: Device,
    pub queue: Queue,
    pub surface: Surface<'static>,
    pub config: SurfaceConfiguration,
}

impl GraphicsContext {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        // 1. Create the Instance (Vulkan/Metal/DX12)
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        // 2. Create Surface (The canvas on the window)
        let surface = instance.create_surface(target)?;

        // 3. Request Adapter (Physical GPU)
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| RenderError::AdapterUnavailable(err.to_string()))?;

        let info = adapter.get_info();
        log::info!(
            "using adapter '{}' ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        // 4. Request Device (Logical GPU connection)
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Prism Device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))?;

        // 5. Configure the Surface
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .ok_or_else(|| RenderError::AdapterUnavailable("surface reports no formats".into()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format, // Usually sRGB
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo, // VSync On
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        Ok(Self {
            device,
            queue,
            surface,
            config,
        })
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Validates the new size and reconfigures the swap surface.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<TargetExtent, RenderError> {
        let extent = TargetExtent::validate(width, height, self.max_texture_dimension())?;
        self.config.width = extent.width;
        self.config.height = extent.height;
        self.surface.configure(&self.device, &self.config);
        Ok(extent)
    }

    /// Reapplies the current configuration after the surface was lost or outdated.
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn acquire(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        self.surface.get_current_texture()
    }
}
