//! WGSL program library.
//!
//! Every program is compiled as `prelude + body`. The prelude is generated from
//! the Rust constants (light model, cluster capacity, clear color) followed by the
//! shared struct layouts and shading functions in `shaders/common.wgsl`, so the
//! two sides cannot drift apart.

use std::{borrow::Cow, collections::HashMap};

use prism_core::MAX_LIGHTS;

use crate::{
    CLEAR_COLOR, RenderError,
    cluster::MAX_LIGHTS_PER_CLUSTER,
    light::{
        AMBIENT, LIGHT_BOB_HEIGHT, LIGHT_EPSILON, LIGHT_ORBIT_RADIUS, LIGHT_ORBIT_SPEED,
        LIGHT_RADIUS_SCALE,
    },
};

pub const NAIVE: &str = "naive";
pub const FORWARD_PLUS: &str = "forward_plus";
pub const GBUFFER_MULTI: &str = "gbuffer_multi";
pub const GBUFFER_PACKED: &str = "gbuffer_packed";
pub const DEFERRED_MULTI: &str = "deferred_multi";
pub const DEFERRED_PACKED: &str = "deferred_packed";
pub const CLUSTER_ASSIGN: &str = "cluster_assign";
pub const MOVE_LIGHTS: &str = "move_lights";
pub const BLOOM_EXTRACT: &str = "bloom_extract";
pub const BLOOM_BLUR: &str = "bloom_blur";
pub const BLOOM_COMPOSITE: &str = "bloom_composite";
pub const PRESENT: &str = "present";

const COMMON: &str = include_str!("shaders/common.wgsl");

const BUILTIN_PROGRAMS: [(&str, &str); 12] = [
    (NAIVE, include_str!("shaders/naive.wgsl")),
    (FORWARD_PLUS, include_str!("shaders/forward_plus.wgsl")),
    (GBUFFER_MULTI, include_str!("shaders/gbuffer_multi.wgsl")),
    (GBUFFER_PACKED, include_str!("shaders/gbuffer_packed.wgsl")),
    (DEFERRED_MULTI, include_str!("shaders/deferred_multi.wgsl")),
    (DEFERRED_PACKED, include_str!("shaders/deferred_packed.wgsl")),
    (CLUSTER_ASSIGN, include_str!("shaders/cluster_assign.wgsl")),
    (MOVE_LIGHTS, include_str!("shaders/move_lights.wgsl")),
    (BLOOM_EXTRACT, include_str!("shaders/bloom_extract.wgsl")),
    (BLOOM_BLUR, include_str!("shaders/bloom_blur.wgsl")),
    (BLOOM_COMPOSITE, include_str!("shaders/bloom_composite.wgsl")),
    (PRESENT, include_str!("shaders/present.wgsl")),
];

/// WGSL float literal (`{:?}` always keeps a decimal point or exponent).
fn float(value: f32) -> String {
    format!("{value:?}")
}

/// Constants and the cluster record, followed by the common WGSL.
pub fn prelude() -> String {
    let [r, g, b, a] = CLEAR_COLOR.map(float);
    let generated = format!(
        "const MAX_LIGHTS: u32 = {MAX_LIGHTS}u;
const MAX_LIGHTS_PER_CLUSTER: u32 = {MAX_LIGHTS_PER_CLUSTER}u;
const LIGHT_RADIUS_SCALE: f32 = {radius_scale};
const LIGHT_EPSILON: f32 = {epsilon};
const AMBIENT: f32 = {ambient};
const LIGHT_ORBIT_SPEED: f32 = {orbit_speed};
const LIGHT_ORBIT_RADIUS: f32 = {orbit_radius};
const LIGHT_BOB_HEIGHT: f32 = {bob_height};
const CLEAR_COLOR: vec4<f32> = vec4<f32>({r}, {g}, {b}, {a});

struct Cluster {{
    min_bounds: vec3<f32>,
    max_bounds: vec3<f32>,
    light_count: u32,
    light_indices: array<u32, {MAX_LIGHTS_PER_CLUSTER}>,
}};
",
        radius_scale = float(LIGHT_RADIUS_SCALE),
        epsilon = float(LIGHT_EPSILON),
        ambient = float(AMBIENT),
        orbit_speed = float(LIGHT_ORBIT_SPEED),
        orbit_radius = float(LIGHT_ORBIT_RADIUS),
        bob_height = float(LIGHT_BOB_HEIGHT),
    );
    generated + "\n" + COMMON
}

pub struct ShaderLibrary {
    prelude: String,
    programs: HashMap<String, Cow<'static, str>>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ShaderLibrary {
    /// Library holding every program the renderer ships with.
    pub fn builtin() -> Self {
        let mut library = Self {
            prelude: prelude(),
            programs: HashMap::with_capacity(BUILTIN_PROGRAMS.len()),
        };
        for (name, body) in BUILTIN_PROGRAMS {
            library.register(name, body);
        }
        library
    }

    /// Adds or replaces a program. The body is compiled after the prelude.
    pub fn register(&mut self, name: impl Into<String>, body: impl Into<Cow<'static, str>>) {
        let name = name.into();
        if self.programs.insert(name.clone(), body.into()).is_some() {
            log::debug!("shader program '{name}' replaced");
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn source(&self, name: &str) -> Result<String, RenderError> {
        let body = self
            .programs
            .get(name)
            .ok_or_else(|| RenderError::UnknownShader(name.to_string()))?;
        Ok(format!("{}\n{}", self.prelude, body))
    }

    pub fn create_module(
        &self,
        device: &wgpu::Device,
        name: &str,
    ) -> Result<wgpu::ShaderModule, RenderError> {
        let source = self.source(name)?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_programs_are_errors() {
        let library = ShaderLibrary::builtin();
        assert!(matches!(
            library.source("does_not_exist"),
            Err(RenderError::UnknownShader(name)) if name == "does_not_exist"
        ));
    }

    #[test]
    fn registered_programs_get_the_prelude() {
        let mut library = ShaderLibrary::builtin();
        library.register("custom", "fn custom() -> f32 { return AMBIENT; }");
        let source = library.source("custom").unwrap();
        assert!(source.starts_with("const MAX_LIGHTS: u32 = 5000u;"));
        assert!(source.ends_with("return AMBIENT; }"));
        assert_eq!(library.names().count(), BUILTIN_PROGRAMS.len() + 1);
    }

    #[test]
    fn prelude_tracks_rust_constants() {
        let prelude = prelude();
        assert!(prelude.contains("array<u32, 256>"));
        assert!(prelude.contains("const LIGHT_EPSILON: f32 = 0.0001;"));
        assert!(prelude.contains("vec4<f32>(0.02, 0.02, 0.03, 1.0)"));
    }

    #[test]
    fn compute_programs_match_dispatch_sizes() {
        let library = ShaderLibrary::builtin();
        let [x, y, z] = crate::cluster::CLUSTER_WORKGROUP_SIZE;
        let cluster = library.source(CLUSTER_ASSIGN).unwrap();
        assert!(cluster.contains(&format!("@workgroup_size({x}, {y}, {z})")));

        let motion = library.source(MOVE_LIGHTS).unwrap();
        assert!(motion.contains(&format!(
            "@workgroup_size({})",
            crate::light::MOTION_WORKGROUP_SIZE
        )));

        let side = crate::bloom::BLOOM_WORKGROUP_SIZE;
        for name in [BLOOM_EXTRACT, BLOOM_BLUR, BLOOM_COMPOSITE] {
            let source = library.source(name).unwrap();
            assert!(source.contains(&format!("@workgroup_size({side}, {side}, 1)")));
        }
    }
}
