//! CPU versions of the fragment shading paths.
//!
//! They follow the WGSL in `shaders/` operation for operation and let tests compare
//! the variants without a GPU.

use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_core::CameraUniforms;

use crate::{
    CLEAR_COLOR,
    cluster::{ClusterGridConfig, ClusterRecord},
    gbuffer::{self, MultiTexel, SurfaceSample},
    light::{AMBIENT, GpuLight, LIGHT_EPSILON, light_falloff, light_radius},
};

pub fn light_contribution(light: &GpuLight, view: Mat4, pos_view: Vec3, normal_view: Vec3) -> Vec3 {
    let light_view = view.transform_point3(Vec3::from_array(light.position));
    let to_light = light_view - pos_view;
    let d = to_light.length();
    let r = light_radius(light.intensity);
    if d >= r {
        return Vec3::ZERO;
    }

    let l = if d > LIGHT_EPSILON {
        to_light / d
    } else {
        normal_view
    };
    let n_dot_l = normal_view.dot(l).max(0.0);
    Vec3::from_array(light.color) * (light.intensity * n_dot_l * light_falloff(d, r))
}

pub fn finish_shading(albedo: Vec3, lighting: Vec3) -> Vec4 {
    (albedo * (Vec3::splat(AMBIENT) + lighting)).extend(1.0)
}

/// Every light, in order.
pub fn shade_naive(lights: &[GpuLight], view: Mat4, surface: &SurfaceSample) -> Vec4 {
    let lighting = lights
        .iter()
        .map(|light| light_contribution(light, view, surface.position, surface.normal))
        .fold(Vec3::ZERO, |acc, c| acc + c);
    finish_shading(surface.albedo, lighting)
}

/// What a clustered shading pass sees of the grid for one frame.
pub struct ClusterView<'a> {
    pub config: &'a ClusterGridConfig,
    pub clusters: &'a [ClusterRecord],
    pub camera: &'a CameraUniforms,
    pub screen_size: Vec2,
}

impl ClusterView<'_> {
    /// Light list of the cell holding a fragment at `frag` with view depth `view_z`.
    pub fn lights_at(&self, frag: Vec2, view_z: f32) -> &[u32] {
        let coord = self.config.cluster_coord(
            frag,
            self.screen_size,
            view_z,
            self.camera.near,
            self.camera.far,
        );
        self.clusters
            .get(self.config.flatten(coord))
            .map(|record| record.light_indices.as_slice())
            .unwrap_or_default()
    }
}

/// Only the lights of the fragment's cluster.
pub fn shade_clustered(
    lights: &[GpuLight],
    grid: &ClusterView,
    frag: Vec2,
    surface: &SurfaceSample,
) -> Vec4 {
    let lighting = grid
        .lights_at(frag, surface.position.z)
        .iter()
        .filter_map(|&i| lights.get(i as usize))
        .map(|light| light_contribution(light, grid.camera.view, surface.position, surface.normal))
        .fold(Vec3::ZERO, |acc, c| acc + c);
    finish_shading(surface.albedo, lighting)
}

/// Deferred lighting over a multi-attachment G-buffer pixel.
pub fn shade_gbuffer_multi(
    lights: &[GpuLight],
    grid: &ClusterView,
    frag: Vec2,
    texel: &MultiTexel,
) -> Vec4 {
    match gbuffer::decode_multi(texel) {
        Some(surface) => shade_clustered(lights, grid, frag, &surface),
        None => Vec4::from_array(CLEAR_COLOR),
    }
}

/// Deferred lighting over a packed G-buffer pixel.
pub fn shade_gbuffer_packed(
    lights: &[GpuLight],
    grid: &ClusterView,
    frag: Vec2,
    texel: [u32; 4],
) -> Vec4 {
    match gbuffer::decode_packed(texel, frag, grid.screen_size, grid.camera.inv_projection) {
        Some(surface) => shade_clustered(lights, grid, frag, &surface),
        None => Vec4::from_array(CLEAR_COLOR),
    }
}
