//! Drawable scene and its draw-call iterator.
//!
//! The scene is handed to the renderer fully built; loading and authoring live
//! elsewhere. Each node owns one uniform buffer for its transform (slot 1) and
//! references a shared mesh and material (slot 2).

use prism_core::Transform;
use wgpu::util::DeviceExt;

use crate::{
    global_resources::SharedLayouts,
    material::{GpuMaterial, Material},
    mesh::{GpuMesh, MeshData, MeshUniform},
};

#[derive(Clone, Debug)]
pub struct NodeDescription {
    pub transform: Transform,
    pub mesh: usize,
    pub material: usize,
}

/// CPU description of everything the renderer draws.
#[derive(Clone, Debug, Default)]
pub struct SceneDescription {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<Material>,
    pub nodes: Vec<NodeDescription>,
}

impl SceneDescription {
    pub fn add_mesh(&mut self, mesh: MeshData) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_node(&mut self, transform: Transform, mesh: usize, material: usize) {
        self.nodes.push(NodeDescription {
            transform,
            mesh,
            material,
        });
    }

    /// Nodes whose mesh or material index points nowhere.
    pub fn dangling_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, node)| {
            (node.mesh >= self.meshes.len() || node.material >= self.materials.len()).then_some(i)
        })
    }
}

struct SceneNode {
    mesh: usize,
    material: usize,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// One drawable unit as the geometry passes consume it.
pub struct DrawCall<'a> {
    pub node_bind_group: &'a wgpu::BindGroup,
    pub material_bind_group: &'a wgpu::BindGroup,
    pub vertex_buffer: &'a wgpu::Buffer,
    pub index_buffer: &'a wgpu::Buffer,
    pub index_count: u32,
}

pub struct Scene {
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
    // Sorted by material so consecutive draws share bind group 2
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &SharedLayouts,
        description: &SceneDescription,
    ) -> Self {
        let meshes = description
            .meshes
            .iter()
            .map(|mesh| GpuMesh::upload(device, mesh))
            .collect();
        let materials = description
            .materials
            .iter()
            .map(|material| GpuMaterial::upload(device, queue, &layouts.material, material))
            .collect();

        let skipped: Vec<usize> = description.dangling_nodes().collect();
        if !skipped.is_empty() {
            log::warn!("skipping {} scene nodes with dangling mesh/material", skipped.len());
        }

        let mut nodes: Vec<SceneNode> = description
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !skipped.contains(i))
            .map(|(_, node)| {
                // 1. Allocate the per-node uniform
                let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Node Uniform Buffer"),
                    contents: bytemuck::bytes_of(&MeshUniform::from_transform(&node.transform)),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });

                // 2. Point group 1 at it
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Node Bind Group"),
                    layout: &layouts.node,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    }],
                });

                SceneNode {
                    mesh: node.mesh,
                    material: node.material,
                    uniform_buffer,
                    bind_group,
                }
            })
            .collect();
        nodes.sort_by_key(|node| (node.material, node.mesh));

        log::info!(
            "scene uploaded: {} meshes, {} materials, {} nodes",
            description.meshes.len(),
            description.materials.len(),
            nodes.len()
        );

        Self {
            meshes,
            materials,
            nodes,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = DrawCall<'_>> {
        self.nodes.iter().map(|node| {
            let mesh = &self.meshes[node.mesh];
            DrawCall {
                node_bind_group: &node.bind_group,
                material_bind_group: &self.materials[node.material].bind_group,
                vertex_buffer: &mesh.vertex_buffer,
                index_buffer: &mesh.index_buffer,
                index_count: mesh.index_count,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn dangling_nodes_are_reported() {
        let mut scene = SceneDescription::default();
        let mesh = scene.add_mesh(MeshData::plane(1.0));
        let material = scene.add_material(Material::from_rgb(1.0, 1.0, 1.0));
        scene.add_node(Transform::default(), mesh, material);
        scene.add_node(Transform::from_xyz(1.0, 0.0, 0.0), mesh, 5);
        scene.add_node(
            Transform::default().with_scale(Vec3::splat(2.0)),
            3,
            material,
        );

        assert_eq!(scene.dangling_nodes().collect::<Vec<_>>(), vec![1, 2]);
    }
}
