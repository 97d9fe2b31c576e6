use std::process::ExitCode;

use glam::Vec3;
use prism_core::{RuntimeConfig, Transform};
use prism_renderer::{SceneDescription, material::Material, mesh::MeshData};

const GRID_SIZE: i32 = 6;
const GRID_SPACING: f32 = 3.0;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RuntimeConfig::from_json_file(&path) {
            Ok(config) => {
                log::info!("loaded configuration from {path}");
                config
            }
            Err(err) => {
                log::error!("could not read configuration '{path}': {err}");
                return ExitCode::FAILURE;
            }
        },
        None => RuntimeConfig::default(),
    };

    log::info!(
        "starting with {:?}, {} lights, bloom {}",
        config.pipeline,
        config.active_light_count,
        if config.bloom_enabled { "on" } else { "off" }
    );

    match prism_window::run_app(config, demo_scene()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Ground plane with a grid of boxes of varying height and colour.
fn demo_scene() -> SceneDescription {
    let mut scene = SceneDescription::default();

    let plane = scene.add_mesh(MeshData::plane(40.0));
    let cube = scene.add_mesh(MeshData::cuboid(Vec3::splat(0.5)));

    let ground = scene.add_material(Material::from_rgb(0.55, 0.55, 0.6));
    let palette = [
        scene.add_material(Material::from_rgb(0.8, 0.3, 0.25)),
        scene.add_material(Material::from_rgb(0.3, 0.7, 0.35)),
        scene.add_material(Material::from_rgb(0.25, 0.4, 0.85)),
        scene.add_material(Material::from_rgb(0.9, 0.8, 0.4)),
    ];

    scene.add_node(Transform::default(), plane, ground);

    let offset = (GRID_SIZE - 1) as f32 * GRID_SPACING * 0.5;
    for x in 0..GRID_SIZE {
        for z in 0..GRID_SIZE {
            let height = 0.5 + ((x * 7 + z * 3) % 5) as f32 * 0.6;
            let mut transform = Transform::from_xyz(
                x as f32 * GRID_SPACING - offset,
                height * 0.5,
                z as f32 * GRID_SPACING - offset,
            )
            .with_scale(Vec3::new(1.2, height, 1.2));
            transform.rotate_y((x + z) as f32 * 0.3);

            let material = palette[((x + z) % palette.len() as i32) as usize];
            scene.add_node(transform, cube, material);
        }
    }

    scene
}
