//! Properties of the light clustering grid, checked against the CPU assignment.

use glam::{IVec3, Mat4, UVec3, Vec2, Vec3};
use prism_core::{Camera, CameraUniforms, OrbitRig};
use prism_renderer::{
    cluster::{
        ClusterGridConfig, ClusterRecord, MAX_LIGHTS_PER_CLUSTER, ViewLight, assign_lights,
        unproject_at_depth,
    },
    light::LightPool,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SCREEN: Vec2 = Vec2::new(1280.0, 720.0);
const CONFIGS: [ClusterGridConfig; 2] = [ClusterGridConfig::FORWARD_PLUS, ClusterGridConfig::DEFERRED];

fn camera_uniforms(view: Mat4) -> CameraUniforms {
    let mut camera = Camera::default();
    camera.set_viewport(SCREEN.x as u32, SCREEN.y as u32);
    camera.uniforms(view)
}

fn total_occupancy(clusters: &[ClusterRecord]) -> u64 {
    clusters.iter().map(|c| c.light_count() as u64).sum()
}

#[test]
fn cells_tile_ndc_without_gaps() {
    for config in CONFIGS {
        let dims = config.dims;

        for x in 0..dims.x {
            let (min, max) = config.cell_ndc(UVec3::new(x, 0, 0));
            if x == 0 {
                assert_eq!(min.x, -1.0);
            } else {
                let (_, prev_max) = config.cell_ndc(UVec3::new(x - 1, 0, 0));
                assert!((prev_max.x - min.x).abs() < 1e-6);
            }
            if x == dims.x - 1 {
                assert!((max.x - 1.0).abs() < 1e-6);
            }
        }
        for y in 0..dims.y {
            let (min, max) = config.cell_ndc(UVec3::new(0, y, 0));
            if y == 0 {
                assert_eq!(min.y, -1.0);
            } else {
                let (_, prev_max) = config.cell_ndc(UVec3::new(0, y - 1, 0));
                assert!((prev_max.y - min.y).abs() < 1e-6);
            }
            if y == dims.y - 1 {
                assert!((max.y - 1.0).abs() < 1e-6);
            }
        }

        let (near, far) = (0.1, 100.0);
        assert_eq!(config.slice_distance(0, near, far), near);
        assert_eq!(config.slice_distance(dims.z, near, far), far);
        for k in 0..dims.z {
            assert!(config.slice_distance(k, near, far) < config.slice_distance(k + 1, near, far));
        }
    }
}

#[test]
fn frustum_points_fall_inside_their_cell_bounds() {
    let uniforms = camera_uniforms(OrbitRig::default().view_matrix());
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for config in CONFIGS {
        for _ in 0..2000 {
            let ndc = Vec2::new(rng.gen_range(-0.999..0.999), rng.gen_range(-0.999..0.999));
            let depth = rng.gen_range(uniforms.near * 1.001..uniforms.far * 0.999);
            let point = unproject_at_depth(uniforms.inv_projection, ndc, depth);
            assert!((point.z + depth).abs() < 1e-3 * depth);

            let frag = Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5) * SCREEN;
            let coord = config.cluster_coord(frag, SCREEN, point.z, uniforms.near, uniforms.far);
            let bounds =
                config.cell_bounds(coord, uniforms.inv_projection, uniforms.near, uniforms.far);

            assert!(
                bounds.contains(point, 1e-3 * depth.max(1.0)),
                "{point} outside cell {coord} {bounds:?}"
            );
        }
    }
}

#[test]
fn small_light_stays_in_its_cell_and_neighbours() {
    let uniforms = camera_uniforms(Mat4::IDENTITY);
    let cases = [
        (ClusterGridConfig::FORWARD_PLUS, UVec3::new(8, 4, 12)),
        (ClusterGridConfig::FORWARD_PLUS, UVec3::new(3, 6, 20)),
        (ClusterGridConfig::DEFERRED, UVec3::new(8, 8, 12)),
    ];

    for (config, home) in cases {
        let bounds = config.cell_bounds(home, uniforms.inv_projection, uniforms.near, uniforms.far);
        let light = ViewLight {
            center: (bounds.min + bounds.max) * 0.5,
            radius: bounds.half_extents().min_element() * 0.25,
        };

        let clusters = assign_lights(&config, &uniforms, &[light]);
        assert_eq!(clusters[config.flatten(home)].light_indices, vec![0]);

        for (index, cluster) in clusters.iter().enumerate() {
            if cluster.light_count() == 0 {
                continue;
            }
            let offset = config.unflatten(index).as_ivec3() - home.as_ivec3();
            assert!(
                offset.abs().cmple(IVec3::ONE).all(),
                "light listed in non-adjacent cell {offset}"
            );
        }
    }
}

#[test]
fn zero_lights_leave_every_cluster_empty() {
    let uniforms = camera_uniforms(OrbitRig::default().view_matrix());
    for config in CONFIGS {
        let clusters = assign_lights(&config, &uniforms, &[]);
        assert_eq!(clusters.len(), config.cluster_count());
        assert!(clusters.iter().all(|c| c.light_count() == 0));
    }
}

#[test]
fn occupancy_never_drops_as_lights_are_added() {
    let view = OrbitRig::default().view_matrix();
    let uniforms = camera_uniforms(view);
    let pool = LightPool::default();
    let config = ClusterGridConfig::FORWARD_PLUS;

    let mut previous = 0;
    for count in [1, 10, 100, 500, 1500] {
        let lights = ViewLight::from_lights(&pool.lights_at(0.0, count), view);
        let occupancy = total_occupancy(&assign_lights(&config, &uniforms, &lights));
        assert!(occupancy >= previous, "{count} lights: {occupancy} < {previous}");
        previous = occupancy;
    }
    assert!(previous > 0);
}

#[test]
fn overflowing_cells_keep_the_first_lights() {
    let uniforms = camera_uniforms(Mat4::IDENTITY);
    let config = ClusterGridConfig::FORWARD_PLUS;
    let home = UVec3::new(8, 4, 12);
    let bounds = config.cell_bounds(home, uniforms.inv_projection, uniforms.near, uniforms.far);

    let crowd = vec![
        ViewLight {
            center: (bounds.min + bounds.max) * 0.5,
            radius: 0.05,
        };
        MAX_LIGHTS_PER_CLUSTER as usize + 44
    ];
    let clusters = assign_lights(&config, &uniforms, &crowd);
    let cell = &clusters[config.flatten(home)];

    assert_eq!(cell.light_count(), MAX_LIGHTS_PER_CLUSTER);
    assert!(cell.light_indices.iter().copied().eq(0..MAX_LIGHTS_PER_CLUSTER));
}

#[test]
fn light_on_a_shared_face_is_listed_by_both_cells() {
    let uniforms = camera_uniforms(Mat4::IDENTITY);
    let config = ClusterGridConfig::DEFERRED;
    let left = UVec3::new(7, 8, 12);
    let right = UVec3::new(8, 8, 12);
    let a = config.cell_bounds(left, uniforms.inv_projection, uniforms.near, uniforms.far);

    // x = 0 is the shared NDC boundary between the two columns
    let center = Vec3::new(0.0, (a.min.y + a.max.y) * 0.5, (a.min.z + a.max.z) * 0.5);
    let light = ViewLight {
        center,
        radius: 0.01,
    };
    let clusters = assign_lights(&config, &uniforms, &[light]);
    assert_eq!(clusters[config.flatten(left)].light_count(), 1);
    assert_eq!(clusters[config.flatten(right)].light_count(), 1);
}
