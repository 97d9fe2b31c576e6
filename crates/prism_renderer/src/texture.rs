use wgpu::{Device, Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages};

use crate::{HDR_FORMAT, RenderError};

/// Pixel size of every size-dependent render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetExtent {
    pub width: u32,
    pub height: u32,
}

impl TargetExtent {
    /// Rejects zero-sized and over-limit extents before any texture is created.
    pub fn validate(width: u32, height: u32, max_dimension: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSizedTarget { width, height });
        }
        if width > max_dimension || height > max_dimension {
            return Err(RenderError::TextureTooLarge {
                width,
                height,
                max: max_dimension,
            });
        }
        Ok(Self { width, height })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    fn to_extent3d(self) -> Extent3d {
        Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Description of one size-dependent texture, kept separate from the allocation
/// so the footprint can be computed without a device.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetDesc {
    pub label: &'static str,
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub extent: TargetExtent,
}

impl TargetDesc {
    pub fn new(
        label: &'static str,
        format: TextureFormat,
        usage: TextureUsages,
        extent: TargetExtent,
    ) -> Self {
        Self {
            label,
            format,
            usage,
            extent,
        }
    }

    pub fn byte_size(&self) -> u64 {
        let texel = self
            .format
            .block_copy_size(None)
            .or_else(|| self.format.block_copy_size(Some(wgpu::TextureAspect::DepthOnly)))
            .unwrap_or(4) as u64;
        texel * self.extent.width as u64 * self.extent.height as u64
    }

    pub fn create(&self, device: &Device) -> GpuTarget {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(self.label),
            size: self.extent.to_extent3d(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.format,
            usage: self.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTarget { texture, view }
    }
}

pub fn total_bytes(descs: &[TargetDesc]) -> u64 {
    descs.iter().map(TargetDesc::byte_size).sum()
}

pub struct GpuTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Runs `create` inside an out-of-memory error scope and turns a captured error into
/// [`RenderError::Allocation`].
pub fn allocate<T>(
    device: &Device,
    label: &str,
    create: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(RenderError::Allocation {
            label: label.to_string(),
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

pub struct TextureHelper;

impl TextureHelper {
    pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float; // Standard depth format

    pub fn depth_desc(extent: TargetExtent) -> TargetDesc {
        TargetDesc::new(
            "Depth Texture",
            Self::DEPTH_FORMAT,
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            extent,
        )
    }

    pub fn color_desc(extent: TargetExtent) -> TargetDesc {
        TargetDesc::new(
            "HDR Color Texture",
            HDR_FORMAT,
            // Sampled by bloom and the present pass
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            extent,
        )
    }
}

/// Color and depth targets shared by every pipeline variant.
pub struct FrameTargets {
    pub extent: TargetExtent,
    pub color: GpuTarget,
    pub depth: GpuTarget,
}

impl FrameTargets {
    pub fn descriptors(extent: TargetExtent) -> Vec<TargetDesc> {
        vec![
            TextureHelper::color_desc(extent),
            TextureHelper::depth_desc(extent),
        ]
    }

    pub fn new(device: &Device, extent: TargetExtent) -> Result<Self, RenderError> {
        let [color, depth] = [
            TextureHelper::color_desc(extent),
            TextureHelper::depth_desc(extent),
        ];
        allocate(device, "frame targets", || Self {
            extent,
            color: color.create(device),
            depth: depth.create(device),
        })
    }
}

/// Sampled texture plus its sampler, used for material bindings.
#[derive(Clone)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl GpuTexture {
    /// Uploads tightly packed RGBA8 pixels.
    pub fn from_rgba8(
        device: &Device,
        queue: &wgpu::Queue,
        pixels: &[u8],
        width: u32,
        height: u32,
        label: Option<&str>,
    ) -> Self {
        let size = Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }
}
