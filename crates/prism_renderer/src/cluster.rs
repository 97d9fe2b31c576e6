//! View-space light clustering.
//!
//! The frustum is cut into `Nx * Ny * Nz` cells: uniform in screen X/Y, uniform or
//! logarithmic in view depth. Every frame a compute pass rebuilds each cell's
//! view-space AABB and the list of lights whose influence sphere touches it.
//! [`assign_lights`] is the CPU mirror of that pass.
//!
//! A light on a shared face is listed by both neighbours, and lights past
//! [`MAX_LIGHTS_PER_CLUSTER`] are dropped from a cell without error.

use glam::{Mat4, UVec3, Vec2, Vec3, Vec4};
use rayon::prelude::*;
use wgpu::util::DeviceExt;

use prism_core::CameraUniforms;

use crate::{
    RenderError,
    global_resources::SharedLayouts,
    light::{GpuLight, light_radius},
    shaders::{self, ShaderLibrary},
    texture::TargetExtent,
};

pub const MAX_LIGHTS_PER_CLUSTER: u32 = 256;

/// Byte stride of one cluster record: `min_bounds` (12 + 4 pad), `max_bounds` (12),
/// `light_count` (4), then the index list.
pub const CLUSTER_STRIDE: u64 = 32 + 4 * MAX_LIGHTS_PER_CLUSTER as u64;

pub const CLUSTER_WORKGROUP_SIZE: [u32; 3] = [4, 4, 4];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthSlicing {
    Uniform,
    /// Finer slices near the camera.
    Logarithmic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterGridConfig {
    pub dims: UVec3,
    pub slicing: DepthSlicing,
}

impl ClusterGridConfig {
    pub const FORWARD_PLUS: Self = Self {
        dims: UVec3::new(16, 9, 24),
        slicing: DepthSlicing::Logarithmic,
    };

    pub const DEFERRED: Self = Self {
        dims: UVec3::new(16, 16, 24),
        slicing: DepthSlicing::Uniform,
    };

    pub fn cluster_count(&self) -> usize {
        (self.dims.x * self.dims.y * self.dims.z) as usize
    }

    pub fn buffer_size(&self) -> u64 {
        self.cluster_count() as u64 * CLUSTER_STRIDE
    }

    pub fn flatten(&self, coord: UVec3) -> usize {
        (coord.x + self.dims.x * (coord.y + self.dims.y * coord.z)) as usize
    }

    pub fn unflatten(&self, index: usize) -> UVec3 {
        let index = index as u32;
        let x = index % self.dims.x;
        let y = (index / self.dims.x) % self.dims.y;
        let z = index / (self.dims.x * self.dims.y);
        UVec3::new(x, y, z)
    }

    /// Positive view distance of depth boundary `k` (0 = near plane, `Nz` = far plane).
    pub fn slice_distance(&self, k: u32, near: f32, far: f32) -> f32 {
        if k >= self.dims.z {
            return far;
        }
        let t = k as f32 / self.dims.z as f32;
        match self.slicing {
            DepthSlicing::Uniform => near + (far - near) * t,
            DepthSlicing::Logarithmic => near * (far / near).powf(t),
        }
    }

    /// Depth slice holding a point at positive view distance `view_depth`.
    pub fn depth_slice(&self, view_depth: f32, near: f32, far: f32) -> u32 {
        let nz = self.dims.z as f32;
        let d = view_depth.clamp(near, far);
        let s = match self.slicing {
            DepthSlicing::Uniform => (d - near) / (far - near) * nz,
            DepthSlicing::Logarithmic => (d / near).ln() / (far / near).ln() * nz,
        };
        s.floor().clamp(0.0, nz - 1.0) as u32
    }

    /// Cell containing a fragment. `frag` is in framebuffer pixels (origin top-left),
    /// `view_z` is the (negative) view-space depth.
    pub fn cluster_coord(
        &self,
        frag: Vec2,
        screen_size: Vec2,
        view_z: f32,
        near: f32,
        far: f32,
    ) -> UVec3 {
        let uv = (frag / screen_size).clamp(Vec2::ZERO, Vec2::ONE);
        let dims = self.dims.truncate().as_vec2();
        let x = (uv.x * dims.x).floor().min(dims.x - 1.0) as u32;
        // NDC y points up, pixel rows go down
        let y = ((1.0 - uv.y) * dims.y).floor().min(dims.y - 1.0) as u32;
        let z = self.depth_slice(-view_z, near, far);
        UVec3::new(x, y, z)
    }

    /// NDC rectangle covered by a cell's column.
    pub fn cell_ndc(&self, coord: UVec3) -> (Vec2, Vec2) {
        let dims = self.dims.truncate().as_vec2();
        let min = coord.truncate().as_vec2() / dims * 2.0 - 1.0;
        let max = (coord.truncate() + 1).as_vec2() / dims * 2.0 - 1.0;
        (min, max)
    }

    /// View-space AABB of a cell: its 8 NDC corners unprojected at the slice's
    /// near and far distances.
    pub fn cell_bounds(&self, coord: UVec3, inv_projection: Mat4, near: f32, far: f32) -> Aabb {
        let (ndc_min, ndc_max) = self.cell_ndc(coord);
        let near_d = self.slice_distance(coord.z, near, far);
        let far_d = self.slice_distance(coord.z + 1, near, far);

        let mut bounds = Aabb::EMPTY;
        for corner in 0..8u32 {
            let ndc = Vec2::new(
                if corner & 1 != 0 { ndc_max.x } else { ndc_min.x },
                if corner & 2 != 0 { ndc_max.y } else { ndc_min.y },
            );
            let d = if corner & 4 != 0 { far_d } else { near_d };
            bounds.extend(unproject_at_depth(inv_projection, ndc, d));
        }
        bounds
    }
}

/// Point on the ray through `ndc` at positive view distance `view_depth`.
pub fn unproject_at_depth(inv_projection: Mat4, ndc: Vec2, view_depth: f32) -> Vec3 {
    let p = inv_projection * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
    let p = p.truncate() / p.w;
    p * (-view_depth / p.z)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn contains(&self, point: Vec3, epsilon: f32) -> bool {
        point.cmpge(self.min - epsilon).all() && point.cmple(self.max + epsilon).all()
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Closed test: a sphere touching a face counts as overlapping.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}

/// A light reduced to what clustering needs.
#[derive(Clone, Copy, Debug)]
pub struct ViewLight {
    pub center: Vec3,
    pub radius: f32,
}

impl ViewLight {
    pub fn from_lights(lights: &[GpuLight], view: Mat4) -> Vec<ViewLight> {
        lights
            .iter()
            .map(|light| ViewLight {
                center: view.transform_point3(Vec3::from_array(light.position)),
                radius: light_radius(light.intensity),
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct ClusterRecord {
    pub bounds: Aabb,
    /// At most `MAX_LIGHTS_PER_CLUSTER` entries, in ascending light order.
    pub light_indices: Vec<u32>,
}

impl ClusterRecord {
    pub fn light_count(&self) -> u32 {
        self.light_indices.len() as u32
    }
}

/// CPU light assignment. Data-parallel over cells; each cell walks the lights in order.
pub fn assign_lights(
    config: &ClusterGridConfig,
    camera: &CameraUniforms,
    lights: &[ViewLight],
) -> Vec<ClusterRecord> {
    (0..config.cluster_count())
        .into_par_iter()
        .map(|index| {
            let coord = config.unflatten(index);
            let bounds = config.cell_bounds(coord, camera.inv_projection, camera.near, camera.far);
            let light_indices = lights
                .iter()
                .enumerate()
                .filter(|(_, light)| bounds.intersects_sphere(light.center, light.radius))
                .map(|(i, _)| i as u32)
                .take(MAX_LIGHTS_PER_CLUSTER as usize)
                .collect();
            ClusterRecord {
                bounds,
                light_indices,
            }
        })
        .collect()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCluster {
    pub min_bounds: [f32; 3],
    pub _padding: u32,
    pub max_bounds: [f32; 3],
    pub light_count: u32,
    pub light_indices: [u32; MAX_LIGHTS_PER_CLUSTER as usize],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterParams {
    pub dims: [u32; 3],
    /// 0 = uniform, 1 = logarithmic
    pub slicing: u32,
    pub screen_size: [f32; 2],
    pub near: f32,
    pub far: f32,
}

impl ClusterParams {
    pub fn new(config: &ClusterGridConfig, camera: &CameraUniforms, extent: TargetExtent) -> Self {
        Self {
            dims: config.dims.to_array(),
            slicing: match config.slicing {
                DepthSlicing::Uniform => 0,
                DepthSlicing::Logarithmic => 1,
            },
            screen_size: [extent.width as f32, extent.height as f32],
            near: camera.near,
            far: camera.far,
        }
    }

    /// Valid contents until the first frame uploads real camera data.
    fn placeholder(config: &ClusterGridConfig) -> Self {
        Self {
            dims: config.dims.to_array(),
            slicing: 0,
            screen_size: [1.0, 1.0],
            near: 0.1,
            far: 1.0,
        }
    }
}

/// GPU side of the grid: cluster buffer, params and the assignment pipeline.
pub struct ClusterGrid {
    config: ClusterGridConfig,
    params_buffer: wgpu::Buffer,
    _cluster_buffer: wgpu::Buffer,
    compute_bind_group: wgpu::BindGroup,
    shading_bind_group: wgpu::BindGroup,
    pipeline: wgpu::ComputePipeline,
}

impl ClusterGrid {
    pub fn new(
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        layouts: &SharedLayouts,
        config: ClusterGridConfig,
    ) -> Result<Self, RenderError> {
        let cluster_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cluster Buffer"),
            size: config.buffer_size(),
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cluster Params Buffer"),
            contents: bytemuck::bytes_of(&ClusterParams::placeholder(&config)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cluster Compute Layout"),
            entries: &[
                // --- BINDING 0: Clusters (written) ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // --- BINDING 1: Grid params ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
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

        let entries = [
            wgpu::BindGroupEntry {
                binding: 0,
                resource: cluster_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: params_buffer.as_entire_binding(),
            },
        ];
        let compute_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cluster Compute Bind Group"),
            layout: &compute_layout,
            entries: &entries,
        });
        let shading_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cluster Shading Bind Group"),
            layout: &layouts.clusters,
            entries: &entries,
        });

        let shader = shaders.create_module(device, shaders::CLUSTER_ASSIGN)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cluster Assign Pipeline Layout"),
            bind_group_layouts: &[&layouts.scene, &compute_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cluster Assign Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        log::debug!(
            "cluster grid {}x{}x{} ({:?} depth), {} KiB",
            config.dims.x,
            config.dims.y,
            config.dims.z,
            config.slicing,
            config.buffer_size() / 1024
        );

        Ok(Self {
            config,
            params_buffer,
            _cluster_buffer: cluster_buffer,
            compute_bind_group,
            shading_bind_group,
            pipeline,
        })
    }

    pub fn config(&self) -> &ClusterGridConfig {
        &self.config
    }

    /// Bound at the cluster slot of the shading pipelines.
    pub fn shading_bind_group(&self) -> &wgpu::BindGroup {
        &self.shading_bind_group
    }

    pub fn update(&self, queue: &wgpu::Queue, camera: &CameraUniforms, extent: TargetExtent) {
        let params = ClusterParams::new(&self.config, camera, extent);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, scene_bind_group: &wgpu::BindGroup) {
        let [wx, wy, wz] = CLUSTER_WORKGROUP_SIZE;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cluster Assign Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, scene_bind_group, &[]);
        pass.set_bind_group(1, &self.compute_bind_group, &[]);
        pass.dispatch_workgroups(
            self.config.dims.x.div_ceil(wx),
            self.config.dims.y.div_ceil(wy),
            self.config.dims.z.div_ceil(wz),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_record_matches_stride() {
        assert_eq!(std::mem::size_of::<GpuCluster>() as u64, CLUSTER_STRIDE);
        assert_eq!(std::mem::offset_of!(GpuCluster, light_count), 28);
        assert_eq!(std::mem::size_of::<ClusterParams>(), 32);
    }

    #[test]
    fn flatten_round_trips() {
        let config = ClusterGridConfig::FORWARD_PLUS;
        for index in [0, 1, 15, 16, 143, 144, config.cluster_count() - 1] {
            assert_eq!(config.flatten(config.unflatten(index)), index);
        }
    }

    #[test]
    fn slices_span_near_to_far() {
        for config in [ClusterGridConfig::FORWARD_PLUS, ClusterGridConfig::DEFERRED] {
            assert_eq!(config.slice_distance(0, 0.1, 100.0), 0.1);
            assert_eq!(config.slice_distance(config.dims.z, 0.1, 100.0), 100.0);
            for k in 0..config.dims.z {
                let (a, b) = (
                    config.slice_distance(k, 0.1, 100.0),
                    config.slice_distance(k + 1, 0.1, 100.0),
                );
                assert!(a < b);
                let mid = 0.5 * (a + b);
                assert_eq!(config.depth_slice(mid, 0.1, 100.0), k);
            }
        }
    }

    #[test]
    fn log_slices_are_finer_near_the_camera() {
        let config = ClusterGridConfig::FORWARD_PLUS;
        let first = config.slice_distance(1, 0.1, 100.0) - config.slice_distance(0, 0.1, 100.0);
        let last = config.slice_distance(24, 0.1, 100.0) - config.slice_distance(23, 0.1, 100.0);
        assert!(first < last);
    }

    #[test]
    fn out_of_range_depths_clamp_to_end_slices() {
        let config = ClusterGridConfig::DEFERRED;
        assert_eq!(config.depth_slice(0.0, 0.1, 100.0), 0);
        assert_eq!(config.depth_slice(1000.0, 0.1, 100.0), config.dims.z - 1);
    }

    #[test]
    fn sphere_test_is_closed() {
        let aabb = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
        assert!(aabb.intersects_sphere(Vec3::new(2.0, 0.5, 0.5), 1.0));
        assert!(!aabb.intersects_sphere(Vec3::new(2.0, 0.5, 0.5), 0.99));
        assert!(aabb.intersects_sphere(Vec3::splat(0.5), 0.01));
    }
}
