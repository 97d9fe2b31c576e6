//! Parses and validates every built-in program the way wgpu will at pipeline creation.

use naga::{
    ShaderStage,
    valid::{Capabilities, ValidationFlags, Validator},
};
use prism_renderer::shaders::{self, ShaderLibrary};

fn parse(library: &ShaderLibrary, name: &str) -> naga::Module {
    let source = library.source(name).expect("built-in program");
    let module = naga::front::wgsl::parse_str(&source)
        .unwrap_or_else(|err| panic!("{name} failed to parse:\n{}", err.emit_to_string(&source)));
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .unwrap_or_else(|err| panic!("{name} failed validation:\n{}", err.emit_to_string(&source)));
    module
}

fn entry_points(module: &naga::Module) -> Vec<(ShaderStage, &str)> {
    module
        .entry_points
        .iter()
        .map(|ep| (ep.stage, ep.name.as_str()))
        .collect()
}

#[test]
fn every_builtin_program_validates() {
    let library = ShaderLibrary::builtin();
    let names: Vec<&str> = library.names().collect();
    assert_eq!(names.len(), 12);
    for name in names {
        parse(&library, name);
    }
}

#[test]
fn programs_expose_the_entry_points_pipelines_ask_for() {
    let library = ShaderLibrary::builtin();

    for name in [shaders::NAIVE, shaders::FORWARD_PLUS, shaders::GBUFFER_MULTI, shaders::GBUFFER_PACKED] {
        let module = parse(&library, name);
        let eps = entry_points(&module);
        assert!(eps.contains(&(ShaderStage::Vertex, "vs_main")), "{name}");
        assert!(eps.contains(&(ShaderStage::Fragment, "fs_main")), "{name}");
    }

    for name in [shaders::DEFERRED_MULTI, shaders::DEFERRED_PACKED, shaders::PRESENT] {
        let module = parse(&library, name);
        let eps = entry_points(&module);
        assert!(eps.contains(&(ShaderStage::Vertex, "vs_fullscreen")), "{name}");
        assert!(eps.contains(&(ShaderStage::Fragment, "fs_main")), "{name}");
    }

    for name in [
        shaders::CLUSTER_ASSIGN,
        shaders::MOVE_LIGHTS,
        shaders::BLOOM_EXTRACT,
        shaders::BLOOM_BLUR,
        shaders::BLOOM_COMPOSITE,
    ] {
        let module = parse(&library, name);
        assert_eq!(entry_points(&module), vec![(ShaderStage::Compute, "cs_main")], "{name}");
    }
}

#[test]
fn registered_programs_are_validated_with_the_prelude() {
    let mut library = ShaderLibrary::builtin();
    library.register(
        "unlit",
        "@compute @workgroup_size(1)\nfn cs_main() { let r = light_radius(4.0); }\n",
    );
    parse(&library, "unlit");
}
