use prism_core::CameraUniforms;
use wgpu::util::DeviceExt;

use crate::{light::LightStore, texture::TargetExtent};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCameraUniforms {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub params: [f32; 4], // near, far, viewport width, viewport height
}

impl GpuCameraUniforms {
    pub fn new(camera: &CameraUniforms, extent: TargetExtent) -> Self {
        Self {
            view: camera.view.to_cols_array_2d(),
            inv_view: camera.inv_view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            inv_projection: camera.inv_projection.to_cols_array_2d(),
            view_proj: camera.view_proj.to_cols_array_2d(),
            inv_view_proj: camera.inv_view_proj.to_cols_array_2d(),
            params: [
                camera.near,
                camera.far,
                extent.width as f32,
                extent.height as f32,
            ],
        }
    }
}

/// Bind group layouts every variant builds its pipelines against.
///
/// Slots: 0 = scene (camera + lights), 1 = node transform, 2 = material,
/// and the cluster layout at whichever slot follows a variant's last group.
#[derive(Clone)]
pub struct SharedLayouts {
    pub scene: wgpu::BindGroupLayout,
    pub node: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub clusters: wgpu::BindGroupLayout,
}

impl SharedLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let scene = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Camera matrices ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX
                        | wgpu::ShaderStages::FRAGMENT
                        | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // --- BINDING 1: Light set (read-only outside the motion pass) ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let node = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Node Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Model + normal matrix ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Diffuse Texture ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                // --- BINDING 1: Sampler ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let clusters = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cluster Shading Layout"),
            entries: &[
                // --- BINDING 0: Cluster records ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // --- BINDING 1: Grid params ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        Self {
            scene,
            node,
            material,
            clusters,
        }
    }
}

/// The scene bind group (slot 0): camera uniform plus the light set.
pub struct GlobalResources {
    pub bind_group: wgpu::BindGroup,
    cam_buffer: wgpu::Buffer,
}

impl GlobalResources {
    pub fn new(device: &wgpu::Device, layouts: &SharedLayouts, lights: &LightStore) -> Self {
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::bytes_of(&GpuCameraUniforms::new(
                &prism_core::Camera::default().uniforms(glam::Mat4::IDENTITY),
                TargetExtent {
                    width: 1,
                    height: 1,
                },
            )),
            // USAGE: COPY_DST allows us to write to it later!
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &layouts.scene,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.light_buffer().as_entire_binding(),
                },
            ],
        });

        Self {
            bind_group,
            cam_buffer: camera_buffer,
        }
    }

    pub fn update_camera(&self, queue: &wgpu::Queue, camera: &CameraUniforms, extent: TargetExtent) {
        queue.write_buffer(
            &self.cam_buffer,
            0,
            bytemuck::bytes_of(&GpuCameraUniforms::new(camera, extent)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_uniform_is_six_matrices_and_params() {
        assert_eq!(std::mem::size_of::<GpuCameraUniforms>(), 6 * 64 + 16);
    }
}
