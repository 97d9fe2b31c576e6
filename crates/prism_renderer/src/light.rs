//! Light pool, the closed-form motion model and the GPU light-set buffer.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wgpu::util::DeviceExt;

use prism_core::{LightClock, MAX_LIGHTS};

use crate::{RenderError, shaders::ShaderLibrary};

/// Influence radius is `LIGHT_RADIUS_SCALE * sqrt(intensity)`.
pub const LIGHT_RADIUS_SCALE: f32 = 2.0;
/// Below this distance a light sits on the surface and N.L is taken as 1.
pub const LIGHT_EPSILON: f32 = 1e-4;
pub const AMBIENT: f32 = 0.03;

pub const LIGHT_ORBIT_SPEED: f32 = 0.6;
pub const LIGHT_ORBIT_RADIUS: f32 = 1.5;
pub const LIGHT_BOB_HEIGHT: f32 = 0.5;

pub const MOTION_WORKGROUP_SIZE: u32 = 64;

/// `num_lights` plus padding up to the 16-byte alignment of the light array.
pub const LIGHT_SET_HEADER_SIZE: u64 = std::mem::size_of::<LightSetHeader>() as u64;

const LIGHT_POOL_SEED: u64 = 0x5EED_1157;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub _padding: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightSeed {
    pub origin: [f32; 3],
    pub phase: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightSetHeader {
    pub num_lights: u32,
    pub _padding: [u32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MotionParams {
    time: f32,
    _padding: [f32; 3],
}

pub fn light_radius(intensity: f32) -> f32 {
    LIGHT_RADIUS_SCALE * intensity.max(0.0).sqrt()
}

/// Windowed inverse-square falloff. Exactly zero at and beyond `radius`.
pub fn light_falloff(distance: f32, radius: f32) -> f32 {
    let x = distance / radius;
    let x2 = x * x;
    let window = (1.0 - x2 * x2).clamp(0.0, 1.0);
    window * window / (distance * distance + 1.0)
}

/// Position of a light at light-clock time `time`. Pure function of its seed.
pub fn animate_light(seed: &LightSeed, time: f32) -> Vec3 {
    let t = time * LIGHT_ORBIT_SPEED + seed.phase;
    Vec3::from_array(seed.origin)
        + Vec3::new(
            LIGHT_ORBIT_RADIUS * t.cos(),
            LIGHT_BOB_HEIGHT * (2.0 * t).sin(),
            LIGHT_ORBIT_RADIUS * t.sin(),
        )
}

/// Volume the light origins are scattered through.
#[derive(Clone, Copy, Debug)]
pub struct LightBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for LightBounds {
    fn default() -> Self {
        Self {
            min: Vec3::new(-14.0, 0.3, -14.0),
            max: Vec3::new(14.0, 4.0, 14.0),
        }
    }
}

/// CPU copy of the full `MAX_LIGHTS` pool. Colors and intensities never change after
/// generation; only positions move.
#[derive(Clone, Debug)]
pub struct LightPool {
    seeds: Vec<LightSeed>,
    lights: Vec<GpuLight>,
}

impl LightPool {
    pub fn generate(seed: u64, bounds: LightBounds) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut seeds = Vec::with_capacity(MAX_LIGHTS as usize);
        let mut lights = Vec::with_capacity(MAX_LIGHTS as usize);

        for _ in 0..MAX_LIGHTS {
            let seed = LightSeed {
                origin: [
                    rng.gen_range(bounds.min.x..=bounds.max.x),
                    rng.gen_range(bounds.min.y..=bounds.max.y),
                    rng.gen_range(bounds.min.z..=bounds.max.z),
                ],
                phase: rng.gen_range(0.0..std::f32::consts::TAU),
            };
            let light = GpuLight {
                position: animate_light(&seed, 0.0).to_array(),
                intensity: rng.gen_range(1.0..4.0),
                color: [
                    rng.gen_range(0.2..1.0),
                    rng.gen_range(0.2..1.0),
                    rng.gen_range(0.2..1.0),
                ],
                _padding: 0.0,
            };
            seeds.push(seed);
            lights.push(light);
        }

        Self { seeds, lights }
    }

    pub fn seeds(&self) -> &[LightSeed] {
        &self.seeds
    }

    /// The first `count` lights moved to `time`, as the motion pass would leave them.
    pub fn lights_at(&self, time: f32, count: u32) -> Vec<GpuLight> {
        let count = count.min(MAX_LIGHTS) as usize;
        self.seeds
            .iter()
            .zip(&self.lights)
            .take(count)
            .map(|(seed, light)| GpuLight {
                position: animate_light(seed, time).to_array(),
                ..*light
            })
            .collect()
    }
}

impl Default for LightPool {
    fn default() -> Self {
        Self::generate(LIGHT_POOL_SEED, LightBounds::default())
    }
}

/// Owns the light-set storage buffer and the compute pass that moves it.
pub struct LightStore {
    pool: LightPool,
    active_count: u32,
    clock: LightClock,

    light_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    _seed_buffer: wgpu::Buffer,
    motion_bind_group: wgpu::BindGroup,
    motion_pipeline: wgpu::ComputePipeline,
}

impl LightStore {
    pub fn new(
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        active_count: u32,
    ) -> Result<Self, RenderError> {
        let pool = LightPool::default();
        let active_count = active_count.clamp(1, MAX_LIGHTS);

        // 1. Light set: header followed by the whole pool
        let header = LightSetHeader {
            num_lights: active_count,
            _padding: [0; 3],
        };
        let mut contents = bytemuck::bytes_of(&header).to_vec();
        contents.extend_from_slice(bytemuck::cast_slice(&pool.lights));
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Set Buffer"),
            contents: &contents,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        // 2. Static motion inputs
        let seed_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Seed Buffer"),
            contents: bytemuck::cast_slice(&pool.seeds),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Motion Params"),
            contents: bytemuck::bytes_of(&MotionParams {
                time: 0.0,
                _padding: [0.0; 3],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let motion_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Light Motion Layout"),
            entries: &[
                // --- BINDING 0: Light set (written) ---
                storage_entry(0, false),
                // --- BINDING 1: Seeds ---
                storage_entry(1, true),
                // --- BINDING 2: Time ---
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let motion_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Light Motion Bind Group"),
            layout: &motion_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: seed_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let shader = shaders.create_module(device, crate::shaders::MOVE_LIGHTS)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Light Motion Pipeline Layout"),
            bind_group_layouts: &[&motion_layout],
            push_constant_ranges: &[],
        });
        let motion_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Light Motion Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        log::info!("light store ready: {active_count} of {MAX_LIGHTS} lights active");

        Ok(Self {
            pool,
            active_count,
            clock: LightClock::default(),
            light_buffer,
            params_buffer,
            _seed_buffer: seed_buffer,
            motion_bind_group,
            motion_pipeline,
        })
    }

    pub fn light_buffer(&self) -> &wgpu::Buffer {
        &self.light_buffer
    }

    pub fn pool(&self) -> &LightPool {
        &self.pool
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn clock(&self) -> &LightClock {
        &self.clock
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        log::debug!("light motion {}", if frozen { "frozen" } else { "resumed" });
        self.clock.set_frozen(frozen);
    }

    /// Rewrites the header only; the pool itself is never reallocated.
    pub fn set_active_count(&mut self, queue: &wgpu::Queue, count: u32) {
        self.active_count = count.clamp(1, MAX_LIGHTS);
        let header = LightSetHeader {
            num_lights: self.active_count,
            _padding: [0; 3],
        };
        queue.write_buffer(&self.light_buffer, 0, bytemuck::bytes_of(&header));
    }

    /// Advances the light clock and uploads the time the motion pass evaluates.
    pub fn advance(&mut self, queue: &wgpu::Queue, delta_seconds: f32) {
        self.clock.advance(delta_seconds);
        let params = MotionParams {
            time: self.clock.seconds(),
            _padding: [0.0; 3],
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    pub fn record_motion(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Light Motion Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.motion_pipeline);
        pass.set_bind_group(0, &self.motion_bind_group, &[]);
        pass.dispatch_workgroups(self.active_count.div_ceil(MOTION_WORKGROUP_SIZE), 1, 1);
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 32);
        assert_eq!(std::mem::size_of::<LightSeed>(), 16);
        assert_eq!(LIGHT_SET_HEADER_SIZE, 16);
    }

    #[test]
    fn falloff_reaches_zero_at_radius() {
        let radius = light_radius(4.0);
        assert_eq!(radius, 4.0);
        assert_eq!(light_falloff(radius, radius), 0.0);
        assert_eq!(light_falloff(radius * 1.5, radius), 0.0);
        assert!(light_falloff(0.0, radius) > light_falloff(1.0, radius));
    }

    #[test]
    fn pool_generation_is_deterministic() {
        let a = LightPool::generate(7, LightBounds::default());
        let b = LightPool::generate(7, LightBounds::default());
        assert_eq!(a.lights_at(3.0, MAX_LIGHTS), b.lights_at(3.0, MAX_LIGHTS));
        assert_eq!(a.seeds().len(), MAX_LIGHTS as usize);
    }

    #[test]
    fn motion_depends_only_on_time() {
        let pool = LightPool::default();
        assert_eq!(pool.lights_at(1.25, 16), pool.lights_at(1.25, 16));
        assert_ne!(pool.lights_at(0.0, 16), pool.lights_at(1.0, 16));

        let moved = pool.lights_at(2.0, 4);
        let still = pool.lights_at(0.0, 4);
        for (a, b) in moved.iter().zip(&still) {
            assert_eq!(a.color, b.color);
            assert_eq!(a.intensity, b.intensity);
        }
    }

    #[test]
    fn count_is_capped_by_pool_size() {
        let pool = LightPool::default();
        assert_eq!(pool.lights_at(0.0, MAX_LIGHTS + 10).len(), MAX_LIGHTS as usize);
    }
}
