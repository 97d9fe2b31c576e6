use glam::{Vec3, Vec4};
use prism_core::BloomSettings;
use prism_renderer::bloom::{self, HdrImage, LumaImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_image(width: usize, height: usize, max: f32, seed: u64) -> HdrImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pixels = (0..width * height)
        .map(|_| {
            Vec4::new(
                rng.gen_range(0.0..max),
                rng.gen_range(0.0..max),
                rng.gen_range(0.0..max),
                1.0,
            )
        })
        .collect();
    HdrImage {
        width,
        height,
        pixels,
    }
}

#[test]
fn bloom_leaves_images_below_threshold_untouched() {
    let settings = BloomSettings::default();
    // Luminance of any pixel stays below a threshold of 1.0
    let color = random_image(32, 24, 0.9, 1);
    assert_eq!(bloom::apply(&color, &settings), color);
}

#[test]
fn bloom_only_ever_adds_light() {
    let settings = BloomSettings {
        threshold: 0.8,
        intensity: 1.5,
        blur_iterations: 3,
    };
    let color = random_image(40, 30, 3.0, 2);
    let bloomed = bloom::apply(&color, &settings);

    for (before, after) in color.pixels.iter().zip(&bloomed.pixels) {
        assert!((*after - *before).truncate().cmpge(Vec3::ZERO).all());
        assert_eq!(after.w, before.w);
    }
}

#[test]
fn extraction_is_zero_below_threshold() {
    let threshold = 1.2;
    let color = random_image(16, 16, 2.5, 3);
    let brightness = bloom::extract(&color, threshold);

    for (pixel, texel) in color.pixels.iter().zip(&brightness.texels) {
        let luma = bloom::luminance(pixel.truncate());
        if luma <= threshold {
            assert_eq!(*texel, 0.0);
        } else {
            assert!((*texel - (luma - threshold)).abs() < 1e-6);
        }
    }
}

#[test]
fn blur_preserves_energy_away_from_edges() {
    let (width, height) = (64, 64);
    let mut texels = vec![0.0; width * height];
    texels[32 * width + 32] = 10.0;
    let brightness = LumaImage {
        width,
        height,
        texels,
    };

    let blurred = bloom::run_blur(&brightness, 4);
    let total: f32 = blurred.texels.iter().sum();
    assert!((total - 10.0).abs() < 1e-3, "energy {total}");
    assert!(blurred.texels.iter().all(|t| *t >= 0.0));
}

#[test]
fn more_iterations_spread_further() {
    let (width, height) = (48, 48);
    let mut texels = vec![0.0; width * height];
    texels[24 * width + 24] = 1.0;
    let brightness = LumaImage {
        width,
        height,
        texels,
    };

    let narrow = bloom::run_blur(&brightness, 1);
    let wide = bloom::run_blur(&brightness, 4);
    let reach = |image: &LumaImage| image.texels[24 * width + 24 + 8];
    assert_eq!(reach(&narrow), 0.0);
    assert!(reach(&wide) > 0.0);
}
