//! The naive, forward-plus and clustered-deferred shading paths must agree on the
//! same scene, up to G-buffer quantization.

use glam::{Mat4, Vec2, Vec3, Vec4};
use prism_core::{Camera, CameraUniforms, OrbitRig};
use prism_renderer::{
    cluster::{ClusterGridConfig, ClusterRecord, MAX_LIGHTS_PER_CLUSTER, ViewLight, assign_lights},
    gbuffer::{self, SurfaceSample},
    light::{GpuLight, LightPool},
    reference::{self, ClusterView},
};

const SCREEN: Vec2 = Vec2::new(1280.0, 720.0);
const ALBEDO: Vec3 = Vec3::new(0.8, 0.6, 0.4);
const QUANTIZATION_EPSILON: f32 = 5e-3;

fn camera_uniforms(view: Mat4) -> CameraUniforms {
    let mut camera = Camera::default();
    camera.set_viewport(SCREEN.x as u32, SCREEN.y as u32);
    camera.uniforms(view)
}

/// Intersects the pixel's ray with the ground plane `y = 0`.
fn ground_sample(uniforms: &CameraUniforms, frag: Vec2) -> Option<SurfaceSample> {
    let ndc = Vec2::new(frag.x / SCREEN.x * 2.0 - 1.0, 1.0 - frag.y / SCREEN.y * 2.0);
    let near = uniforms.inv_view_proj.project_point3(ndc.extend(0.0));
    let far = uniforms.inv_view_proj.project_point3(ndc.extend(1.0));
    let dir = far - near;
    if dir.y.abs() < 1e-6 {
        return None;
    }
    let t = -near.y / dir.y;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }

    let world = near + dir * t;
    Some(SurfaceSample {
        albedo: ALBEDO,
        normal: uniforms.view.transform_vector3(Vec3::Y).normalize(),
        position: uniforms.view.transform_point3(world),
    })
}

fn ndc_depth(uniforms: &CameraUniforms, position: Vec3) -> f32 {
    let clip = uniforms.projection * position.extend(1.0);
    clip.z / clip.w
}

fn assert_close(a: Vec4, b: Vec4, epsilon: f32, what: &str) {
    assert!(
        (a - b).abs().max_element() <= epsilon,
        "{what}: {a} vs {b}"
    );
}

fn clusters_for(config: &ClusterGridConfig, uniforms: &CameraUniforms, lights: &[GpuLight]) -> Vec<ClusterRecord> {
    assign_lights(config, uniforms, &ViewLight::from_lights(lights, uniforms.view))
}

#[test]
fn single_light_at_look_at_point_matches_across_variants() {
    let target = Vec3::new(0.0, 1.0, 0.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 3.0, 4.0), target, Vec3::Y);
    let uniforms = camera_uniforms(view);
    let lights = [GpuLight {
        position: target.to_array(),
        intensity: 4.0,
        color: [1.0, 1.0, 1.0],
        _padding: 0.0,
    }];

    let frag = SCREEN * 0.5;
    let surface = ground_sample(&uniforms, frag).expect("centre ray hits the ground");

    let naive = reference::shade_naive(&lights, view, &surface);
    assert!(naive.x > ALBEDO.x * 0.03, "light must reach the centre pixel");

    let forward_clusters = clusters_for(&ClusterGridConfig::FORWARD_PLUS, &uniforms, &lights);
    let forward_view = ClusterView {
        config: &ClusterGridConfig::FORWARD_PLUS,
        clusters: &forward_clusters,
        camera: &uniforms,
        screen_size: SCREEN,
    };
    let forward_plus = reference::shade_clustered(&lights, &forward_view, frag, &surface);
    assert_close(naive, forward_plus, 1e-6, "forward-plus");

    let deferred_clusters = clusters_for(&ClusterGridConfig::DEFERRED, &uniforms, &lights);
    let deferred_view = ClusterView {
        config: &ClusterGridConfig::DEFERRED,
        clusters: &deferred_clusters,
        camera: &uniforms,
        screen_size: SCREEN,
    };

    let multi = reference::shade_gbuffer_multi(
        &lights,
        &deferred_view,
        frag,
        &gbuffer::encode_multi(&surface),
    );
    assert_close(naive, multi, QUANTIZATION_EPSILON, "deferred multi-attachment");

    let packed = reference::shade_gbuffer_packed(
        &lights,
        &deferred_view,
        frag,
        gbuffer::encode_packed(&surface, ndc_depth(&uniforms, surface.position)),
    );
    assert_close(naive, packed, QUANTIZATION_EPSILON, "deferred packed");
}

#[test]
fn clustered_shading_matches_naive_across_the_ground() {
    let view = OrbitRig::default().view_matrix();
    let uniforms = camera_uniforms(view);
    let lights = LightPool::default().lights_at(1.25, 100);

    for config in [ClusterGridConfig::FORWARD_PLUS, ClusterGridConfig::DEFERRED] {
        let clusters = clusters_for(&config, &uniforms, &lights);
        assert!(
            clusters.iter().all(|c| c.light_count() < MAX_LIGHTS_PER_CLUSTER),
            "no cell may overflow for exact agreement"
        );
        let grid = ClusterView {
            config: &config,
            clusters: &clusters,
            camera: &uniforms,
            screen_size: SCREEN,
        };

        let mut shaded = 0;
        for py in (0..SCREEN.y as u32).step_by(24) {
            for px in (0..SCREEN.x as u32).step_by(32) {
                let frag = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let Some(surface) = ground_sample(&uniforms, frag) else {
                    continue;
                };
                if -surface.position.z >= uniforms.far {
                    continue;
                }

                let naive = reference::shade_naive(&lights, view, &surface);
                let clustered = reference::shade_clustered(&lights, &grid, frag, &surface);
                assert_close(naive, clustered, 1e-5, "clustered");
                shaded += 1;
            }
        }
        assert!(shaded > 100);
    }
}

#[test]
fn empty_gbuffer_pixels_shade_to_the_clear_color() {
    let uniforms = camera_uniforms(OrbitRig::default().view_matrix());
    let config = ClusterGridConfig::DEFERRED;
    let clusters = clusters_for(&config, &uniforms, &[]);
    let grid = ClusterView {
        config: &config,
        clusters: &clusters,
        camera: &uniforms,
        screen_size: SCREEN,
    };
    let clear = Vec4::from_array(prism_renderer::CLEAR_COLOR);
    let frag = SCREEN * 0.25;

    assert_eq!(reference::shade_gbuffer_packed(&[], &grid, frag, [0; 4]), clear);

    let background = gbuffer::MultiTexel {
        albedo: [0; 4],
        normal: [half::f16::ZERO; 4],
        position: [half::f16::ZERO; 4],
    };
    assert_eq!(reference::shade_gbuffer_multi(&[], &grid, frag, &background), clear);
}
