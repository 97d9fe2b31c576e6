//! Bloom post-process: extract -> ping-pong blur -> composite -> optional debug copy.
//!
//! The blur is separable and runs `2 * K` compute dispatches. A single 4-byte
//! direction buffer is rewritten (by a buffer copy from one of two constant flag
//! buffers) before every dispatch, so consecutive iterations always alternate
//! horizontal and vertical. Each iteration runs in its own compute pass to order
//! the copy against the previous dispatch.

use glam::{Vec3, Vec4};
use prism_core::BloomSettings;
use wgpu::{TextureFormat, TextureUsages, util::DeviceExt};

use crate::{
    HDR_FORMAT, RenderError,
    shaders::{self, ShaderLibrary},
    texture::{GpuTarget, TargetDesc, TargetExtent, allocate},
};

pub const BLOOM_WORKGROUP_SIZE: u32 = 8;
pub const BRIGHTNESS_FORMAT: TextureFormat = TextureFormat::R32Float;
pub const COMPOSITE_FORMAT: TextureFormat = HDR_FORMAT;

/// Center weight followed by the four symmetric taps.
pub const BLUR_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

const DIRECTION_SIZE: wgpu::BufferAddress = std::mem::size_of::<u32>() as wgpu::BufferAddress;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BloomParams {
    pub threshold: f32,
    pub intensity: f32,
    pub _padding: [f32; 2],
}

impl From<&BloomSettings> for BloomParams {
    fn from(settings: &BloomSettings) -> Self {
        Self {
            threshold: settings.threshold,
            intensity: settings.intensity,
            _padding: [0.0; 2],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    /// Value the blur shader reads from the direction buffer.
    pub fn flag(self) -> u32 {
        match self {
            BlurDirection::Horizontal => 0,
            BlurDirection::Vertical => 1,
        }
    }

    fn axis(self) -> (isize, isize) {
        match self {
            BlurDirection::Horizontal => (1, 0),
            BlurDirection::Vertical => (0, 1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurSlot {
    Brightness,
    Ping,
    Pong,
}

/// One blur dispatch: which direction, read from where, write to where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlurStep {
    pub direction: BlurDirection,
    pub input: BlurSlot,
    pub output: BlurSlot,
}

/// The `2 * K` dispatches of the blur. The first reads the brightness buffer, the
/// last writes `Pong`.
pub fn blur_schedule(iterations: u32) -> Vec<BlurStep> {
    (0..2 * iterations)
        .map(|i| {
            let direction = if i % 2 == 0 {
                BlurDirection::Horizontal
            } else {
                BlurDirection::Vertical
            };
            let (input, output) = match i {
                0 => (BlurSlot::Brightness, BlurSlot::Ping),
                i if i % 2 == 1 => (BlurSlot::Ping, BlurSlot::Pong),
                _ => (BlurSlot::Pong, BlurSlot::Ping),
            };
            BlurStep {
                direction,
                input,
                output,
            }
        })
        .collect()
}

const INTERMEDIATE_USAGE: TextureUsages = TextureUsages::STORAGE_BINDING
    .union(TextureUsages::TEXTURE_BINDING)
    .union(TextureUsages::COPY_SRC);

/// Size-dependent textures of the chain, in allocation order.
pub fn descriptors(extent: TargetExtent, debug_copy: bool) -> Vec<TargetDesc> {
    let mut descs = vec![
        TargetDesc::new("Bloom Brightness", BRIGHTNESS_FORMAT, INTERMEDIATE_USAGE, extent),
        TargetDesc::new("Bloom Ping", BRIGHTNESS_FORMAT, INTERMEDIATE_USAGE, extent),
        TargetDesc::new("Bloom Pong", BRIGHTNESS_FORMAT, INTERMEDIATE_USAGE, extent),
        TargetDesc::new(
            "Bloom Composite",
            COMPOSITE_FORMAT,
            TextureUsages::STORAGE_BINDING | TextureUsages::TEXTURE_BINDING,
            extent,
        ),
    ];
    if debug_copy {
        let usage = TextureUsages::COPY_DST | TextureUsages::TEXTURE_BINDING;
        descs.push(TargetDesc::new("Bloom Debug Brightness", BRIGHTNESS_FORMAT, usage, extent));
        descs.push(TargetDesc::new("Bloom Debug Blur", BRIGHTNESS_FORMAT, usage, extent));
    }
    descs
}

/// Buffers and layouts that outlive a resize.
struct BloomBindings {
    params_buffer: wgpu::Buffer,
    direction_buffer: wgpu::Buffer,
    horizontal_flag: wgpu::Buffer,
    vertical_flag: wgpu::Buffer,

    extract_layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
}

impl BloomBindings {
    fn new(device: &wgpu::Device, settings: &BloomSettings) -> Self {
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bloom Params"),
            contents: bytemuck::bytes_of(&BloomParams::from(settings)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let direction_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bloom Blur Direction"),
            size: DIRECTION_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let flag_buffer = |label: &str, direction: BlurDirection| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&direction.flag()),
                usage: wgpu::BufferUsages::COPY_SRC,
            })
        };

        let extract_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Extract Layout"),
            entries: &[
                texture_entry(0),
                storage_texture_entry(1, BRIGHTNESS_FORMAT),
                uniform_entry(2),
            ],
        });
        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Blur Layout"),
            entries: &[
                texture_entry(0),
                storage_texture_entry(1, BRIGHTNESS_FORMAT),
                // --- BINDING 2: Direction flag ---
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Composite Layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                storage_texture_entry(2, COMPOSITE_FORMAT),
                uniform_entry(3),
            ],
        });

        Self {
            params_buffer,
            direction_buffer,
            horizontal_flag: flag_buffer("Bloom Horizontal Flag", BlurDirection::Horizontal),
            vertical_flag: flag_buffer("Bloom Vertical Flag", BlurDirection::Vertical),
            extract_layout,
            blur_layout,
            composite_layout,
        }
    }
}

/// Everything that depends on the framebuffer size or the color target.
struct BloomTargets {
    extent: TargetExtent,
    brightness: GpuTarget,
    pong: GpuTarget,
    composite: GpuTarget,
    debug: Option<(GpuTarget, GpuTarget)>,
    // Read through the bind groups only
    _ping: GpuTarget,

    extract_bind_group: wgpu::BindGroup,
    // brightness -> ping, ping -> pong, pong -> ping
    blur_bind_groups: [wgpu::BindGroup; 3],
    composite_bind_group: wgpu::BindGroup,
}

impl BloomTargets {
    fn new(
        device: &wgpu::Device,
        bindings: &BloomBindings,
        color: &wgpu::TextureView,
        extent: TargetExtent,
        debug_copy: bool,
    ) -> Result<Self, RenderError> {
        let descs = descriptors(extent, debug_copy);
        let mut created = allocate(device, "bloom targets", || {
            descs
                .iter()
                .map(|desc| desc.create(device))
                .collect::<Vec<_>>()
        })?
        .into_iter();

        let mut next = || {
            created.next().ok_or_else(|| RenderError::Allocation {
                label: "bloom targets".to_string(),
                message: "missing intermediate texture".to_string(),
            })
        };
        let brightness = next()?;
        let ping = next()?;
        let pong = next()?;
        let composite = next()?;
        let debug = if debug_copy {
            Some((next()?, next()?))
        } else {
            None
        };

        let extract_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Extract Bind Group"),
            layout: &bindings.extract_layout,
            entries: &[
                view_entry(0, color),
                view_entry(1, &brightness.view),
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bindings.params_buffer.as_entire_binding(),
                },
            ],
        });

        let blur_bind_group = |label: &str, input: &GpuTarget, output: &GpuTarget| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bindings.blur_layout,
                entries: &[
                    view_entry(0, &input.view),
                    view_entry(1, &output.view),
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: bindings.direction_buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let blur_bind_groups = [
            blur_bind_group("Bloom Blur Brightness->Ping", &brightness, &ping),
            blur_bind_group("Bloom Blur Ping->Pong", &ping, &pong),
            blur_bind_group("Bloom Blur Pong->Ping", &pong, &ping),
        ];

        let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Composite Bind Group"),
            layout: &bindings.composite_layout,
            entries: &[
                view_entry(0, color),
                view_entry(1, &pong.view),
                view_entry(2, &composite.view),
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: bindings.params_buffer.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            extent,
            brightness,
            pong,
            composite,
            debug,
            _ping: ping,
            extract_bind_group,
            blur_bind_groups,
            composite_bind_group,
        })
    }
}

pub struct BloomChain {
    settings: BloomSettings,
    debug_copy: bool,
    bindings: BloomBindings,

    extract_pipeline: wgpu::ComputePipeline,
    blur_pipeline: wgpu::ComputePipeline,
    composite_pipeline: wgpu::ComputePipeline,

    targets: BloomTargets,
}

impl BloomChain {
    pub fn new(
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        color: &wgpu::TextureView,
        extent: TargetExtent,
        settings: &BloomSettings,
    ) -> Result<Self, RenderError> {
        let bindings = BloomBindings::new(device, settings);

        let extract_pipeline = compute_pipeline(
            device,
            shaders,
            shaders::BLOOM_EXTRACT,
            "Bloom Extract Pipeline",
            &bindings.extract_layout,
        )?;
        let blur_pipeline = compute_pipeline(
            device,
            shaders,
            shaders::BLOOM_BLUR,
            "Bloom Blur Pipeline",
            &bindings.blur_layout,
        )?;
        let composite_pipeline = compute_pipeline(
            device,
            shaders,
            shaders::BLOOM_COMPOSITE,
            "Bloom Composite Pipeline",
            &bindings.composite_layout,
        )?;

        let targets = BloomTargets::new(device, &bindings, color, extent, false)?;

        log::info!(
            "bloom chain ready: threshold {}, intensity {}, {} blur passes",
            settings.threshold,
            settings.intensity,
            2 * settings.blur_iterations
        );

        Ok(Self {
            settings: settings.clone(),
            debug_copy: false,
            bindings,
            extract_pipeline,
            blur_pipeline,
            composite_pipeline,
            targets,
        })
    }

    /// Reallocates every intermediate against the new color target.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        color: &wgpu::TextureView,
        extent: TargetExtent,
    ) -> Result<(), RenderError> {
        self.targets = BloomTargets::new(device, &self.bindings, color, extent, self.debug_copy)?;
        log::debug!("bloom targets resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    pub fn settings(&self) -> &BloomSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, queue: &wgpu::Queue, settings: &BloomSettings) {
        self.settings = settings.clone();
        queue.write_buffer(
            &self.bindings.params_buffer,
            0,
            bytemuck::bytes_of(&BloomParams::from(settings)),
        );
    }

    /// Toggles the debug copy of the brightness and final blur buffers.
    pub fn set_debug_copy(
        &mut self,
        device: &wgpu::Device,
        color: &wgpu::TextureView,
        enabled: bool,
    ) -> Result<(), RenderError> {
        if self.debug_copy != enabled {
            self.targets =
                BloomTargets::new(device, &self.bindings, color, self.targets.extent, enabled)?;
            self.debug_copy = enabled;
        }
        Ok(())
    }

    /// Brightness and blurred copies, present only while the debug copy is on.
    pub fn debug_views(&self) -> Option<(&wgpu::TextureView, &wgpu::TextureView)> {
        self.targets
            .debug
            .as_ref()
            .map(|(brightness, blur)| (&brightness.view, &blur.view))
    }

    /// The composited HDR image the present pass reads when bloom is on.
    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.targets.composite.view
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder) {
        let targets = &self.targets;
        let groups = (
            targets.extent.width.div_ceil(BLOOM_WORKGROUP_SIZE),
            targets.extent.height.div_ceil(BLOOM_WORKGROUP_SIZE),
        );

        // 1. Brightness extraction
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bloom Extract Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.extract_pipeline);
            pass.set_bind_group(0, &targets.extract_bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        // 2. Separable blur, direction rewritten before every dispatch
        for step in blur_schedule(self.settings.blur_iterations) {
            let (flag, label) = match step.direction {
                BlurDirection::Horizontal => (&self.bindings.horizontal_flag, "Bloom Blur H Pass"),
                BlurDirection::Vertical => (&self.bindings.vertical_flag, "Bloom Blur V Pass"),
            };
            encoder.copy_buffer_to_buffer(
                flag,
                0,
                &self.bindings.direction_buffer,
                0,
                DIRECTION_SIZE,
            );

            let bind_group = match step.input {
                BlurSlot::Brightness => &targets.blur_bind_groups[0],
                BlurSlot::Ping => &targets.blur_bind_groups[1],
                BlurSlot::Pong => &targets.blur_bind_groups[2],
            };
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.blur_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        // 3. Composite
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bloom Composite Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &targets.composite_bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }

        // 4. Debug copy
        if let Some((debug_brightness, debug_blur)) = &targets.debug {
            let size = wgpu::Extent3d {
                width: targets.extent.width,
                height: targets.extent.height,
                depth_or_array_layers: 1,
            };
            encoder.copy_texture_to_texture(
                targets.brightness.texture.as_image_copy(),
                debug_brightness.texture.as_image_copy(),
                size,
            );
            encoder.copy_texture_to_texture(
                targets.pong.texture.as_image_copy(),
                debug_blur.texture.as_image_copy(),
                size,
            );
        }
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    shaders: &ShaderLibrary,
    name: &str,
    label: &str,
    layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::ComputePipeline, RenderError> {
    let module = shaders.create_module(device, name)?;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("cs_main"),
        compilation_options: Default::default(),
        cache: None,
    }))
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

fn storage_texture_entry(binding: u32, format: TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn view_entry(binding: u32, view: &wgpu::TextureView) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::TextureView(view),
    }
}

// CPU mirror of the chain, pixel for pixel.

/// Row-major HDR image.
#[derive(Clone, Debug, PartialEq)]
pub struct HdrImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Vec4>,
}

/// Row-major single-channel image.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaImage {
    pub width: usize,
    pub height: usize,
    pub texels: Vec<f32>,
}

impl LumaImage {
    fn get(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.texels[y * self.width + x]
    }
}

pub fn luminance(color: Vec3) -> f32 {
    color.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

pub fn extract(color: &HdrImage, threshold: f32) -> LumaImage {
    LumaImage {
        width: color.width,
        height: color.height,
        texels: color
            .pixels
            .iter()
            .map(|p| (luminance(p.truncate()) - threshold).max(0.0))
            .collect(),
    }
}

/// One 9-tap separable pass with clamp-to-edge addressing.
pub fn blur_pass(input: &LumaImage, direction: BlurDirection) -> LumaImage {
    let (ax, ay) = direction.axis();
    let mut texels = Vec::with_capacity(input.texels.len());
    for y in 0..input.height as isize {
        for x in 0..input.width as isize {
            let mut sum = input.get(x, y) * BLUR_WEIGHTS[0];
            for (i, weight) in BLUR_WEIGHTS.iter().enumerate().skip(1) {
                let i = i as isize;
                sum += (input.get(x + ax * i, y + ay * i) + input.get(x - ax * i, y - ay * i))
                    * weight;
            }
            texels.push(sum);
        }
    }
    LumaImage {
        width: input.width,
        height: input.height,
        texels,
    }
}

/// Runs [`blur_schedule`] over explicit ping/pong buffers.
pub fn run_blur(brightness: &LumaImage, iterations: u32) -> LumaImage {
    let mut ping = brightness.clone();
    let mut pong = brightness.clone();
    for step in blur_schedule(iterations) {
        let input = match step.input {
            BlurSlot::Brightness => brightness,
            BlurSlot::Ping => &ping,
            BlurSlot::Pong => &pong,
        };
        let output = blur_pass(input, step.direction);
        if step.output == BlurSlot::Ping {
            ping = output;
        } else {
            pong = output;
        }
    }
    pong
}

pub fn composite(color: &HdrImage, blurred: &LumaImage, intensity: f32) -> HdrImage {
    HdrImage {
        width: color.width,
        height: color.height,
        pixels: color
            .pixels
            .iter()
            .zip(&blurred.texels)
            .map(|(c, b)| (c.truncate() + Vec3::splat(b * intensity)).extend(c.w))
            .collect(),
    }
}

/// Whole chain as it runs when bloom is enabled.
pub fn apply(color: &HdrImage, settings: &BloomSettings) -> HdrImage {
    let blurred = run_blur(&extract(color, settings.threshold), settings.blur_iterations);
    composite(color, &blurred, settings.intensity)
}
