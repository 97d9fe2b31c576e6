use prism_core::{Camera, GBufferPacking};
use prism_renderer::{
    RenderError, bloom, gbuffer,
    texture::{FrameTargets, TargetDesc, TargetExtent, total_bytes},
};

const MAX_DIMENSION: u32 = 8192;

/// Every size-dependent texture the renderer holds with bloom on and the
/// deferred variant active.
fn size_dependent_targets(extent: TargetExtent, packing: GBufferPacking) -> Vec<TargetDesc> {
    let mut descs = FrameTargets::descriptors(extent);
    descs.extend(gbuffer::descriptors(packing, extent));
    descs.extend(bloom::descriptors(extent, false));
    descs
}

/// What a resize to `width` x `height` leaves behind: footprint and aspect ratio.
fn resize(camera: &mut Camera, width: u32, height: u32, packing: GBufferPacking) -> (Vec<TargetDesc>, f32) {
    let extent = TargetExtent::validate(width, height, MAX_DIMENSION).expect("valid size");
    camera.set_viewport(extent.width, extent.height);
    (size_dependent_targets(extent, packing), camera.aspect_ratio)
}

#[test]
fn resize_round_trip_restores_footprint_and_aspect() {
    for packing in [GBufferPacking::MultiAttachment, GBufferPacking::Packed] {
        let mut camera = Camera::default();
        let (a, aspect_a) = resize(&mut camera, 1280, 720, packing);
        let (b, aspect_b) = resize(&mut camera, 1920, 1200, packing);
        let (a_again, aspect_a_again) = resize(&mut camera, 1280, 720, packing);

        assert_ne!(total_bytes(&a), total_bytes(&b));
        assert_ne!(aspect_a, aspect_b);
        assert_eq!(a, a_again);
        assert_eq!(total_bytes(&a), total_bytes(&a_again));
        assert_eq!(aspect_a, aspect_a_again);
    }
}

#[test]
fn every_target_follows_the_new_extent() {
    let extent = TargetExtent::validate(800, 600, MAX_DIMENSION).expect("valid size");
    for desc in size_dependent_targets(extent, GBufferPacking::Packed) {
        assert_eq!(desc.extent, extent, "{} kept a stale size", desc.label);
    }
}

#[test]
fn footprint_scales_with_pixel_count() {
    let small = TargetExtent::validate(640, 360, MAX_DIMENSION).expect("valid size");
    let large = TargetExtent::validate(1280, 720, MAX_DIMENSION).expect("valid size");
    let packing = GBufferPacking::MultiAttachment;
    assert_eq!(
        total_bytes(&size_dependent_targets(large, packing)),
        4 * total_bytes(&size_dependent_targets(small, packing))
    );
}

#[test]
fn degenerate_sizes_are_rejected() {
    assert!(matches!(
        TargetExtent::validate(0, 720, MAX_DIMENSION),
        Err(RenderError::ZeroSizedTarget { .. })
    ));
    assert!(matches!(
        TargetExtent::validate(1280, MAX_DIMENSION + 1, MAX_DIMENSION),
        Err(RenderError::TextureTooLarge { .. })
    ));
}
