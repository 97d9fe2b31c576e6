//! G-buffer encodings for the deferred variant.
//!
//! Both strategies carry the same surface: albedo, view-space normal and view-space
//! position. Multi-attachment stores them in three render targets. Packed folds
//! everything into one `Rgba32Uint` texel:
//!
//! | channel | content                                   |
//! |---------|-------------------------------------------|
//! | x       | octahedral normal, `pack2x16snorm`        |
//! | y       | albedo, `pack4x8unorm`                    |
//! | z       | NDC depth bits; position rebuilt through the inverse projection |
//! | w       | coverage flag (0 = background)            |
//!
//! The `encode_*`/`decode_*` functions mirror the shader code bit for bit where the
//! hardware conversion is exactly specified.

use glam::{Mat4, Vec2, Vec3, Vec4};
use half::f16;
use prism_core::GBufferPacking;
use wgpu::{TextureFormat, TextureUsages};

use crate::{
    RenderError,
    texture::{GpuTarget, TargetDesc, TargetExtent, allocate},
};

pub const ALBEDO_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const POSITION_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const PACKED_FORMAT: TextureFormat = TextureFormat::Rgba32Uint;

const GBUFFER_USAGE: TextureUsages =
    TextureUsages::RENDER_ATTACHMENT.union(TextureUsages::TEXTURE_BINDING);

pub fn formats(packing: GBufferPacking) -> &'static [TextureFormat] {
    match packing {
        GBufferPacking::MultiAttachment => &[ALBEDO_FORMAT, NORMAL_FORMAT, POSITION_FORMAT],
        GBufferPacking::Packed => &[PACKED_FORMAT],
    }
}

pub fn descriptors(packing: GBufferPacking, extent: TargetExtent) -> Vec<TargetDesc> {
    match packing {
        GBufferPacking::MultiAttachment => vec![
            TargetDesc::new("GBuffer Albedo", ALBEDO_FORMAT, GBUFFER_USAGE, extent),
            TargetDesc::new("GBuffer Normal", NORMAL_FORMAT, GBUFFER_USAGE, extent),
            TargetDesc::new("GBuffer Position", POSITION_FORMAT, GBUFFER_USAGE, extent),
        ],
        GBufferPacking::Packed => vec![TargetDesc::new(
            "GBuffer Packed",
            PACKED_FORMAT,
            GBUFFER_USAGE,
            extent,
        )],
    }
}

/// Color targets of the geometry pass, in attachment order.
pub fn color_targets(packing: GBufferPacking) -> Vec<Option<wgpu::ColorTargetState>> {
    formats(packing)
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect()
}

/// Layout the lighting pass reads the G-buffer through (one texture per attachment).
pub fn read_layout(device: &wgpu::Device, packing: GBufferPacking) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = formats(packing)
        .iter()
        .enumerate()
        .map(|(binding, format)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: match format {
                    TextureFormat::Rgba32Uint => wgpu::TextureSampleType::Uint,
                    _ => wgpu::TextureSampleType::Float { filterable: false },
                },
            },
            count: None,
        })
        .collect();

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("GBuffer Read Layout"),
        entries: &entries,
    })
}

/// Size-dependent G-buffer textures plus the bind group the lighting pass reads.
pub struct GBuffer {
    packing: GBufferPacking,
    targets: Vec<GpuTarget>,
    read_bind_group: wgpu::BindGroup,
}

impl GBuffer {
    pub fn new(
        device: &wgpu::Device,
        packing: GBufferPacking,
        extent: TargetExtent,
        read_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, RenderError> {
        let descs = descriptors(packing, extent);
        let targets: Vec<GpuTarget> = allocate(device, "gbuffer", || {
            descs.iter().map(|desc| desc.create(device)).collect()
        })?;

        let entries: Vec<_> = targets
            .iter()
            .enumerate()
            .map(|(binding, target)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(&target.view),
            })
            .collect();
        let read_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GBuffer Read Bind Group"),
            layout: read_layout,
            entries: &entries,
        });

        log::debug!(
            "gbuffer {:?} allocated at {}x{}",
            packing,
            extent.width,
            extent.height
        );

        Ok(Self {
            packing,
            targets,
            read_bind_group,
        })
    }

    pub fn packing(&self) -> GBufferPacking {
        self.packing
    }

    pub fn read_bind_group(&self) -> &wgpu::BindGroup {
        &self.read_bind_group
    }

    /// Attachments for the geometry pass, all cleared to zero (no coverage).
    pub fn color_attachments(&self) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
        self.targets
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect()
    }
}

/// One shaded point as the lighting stage sees it. Vectors are in view space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSample {
    pub albedo: Vec3,
    pub normal: Vec3,
    pub position: Vec3,
}

/// The three multi-attachment texels of one pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiTexel {
    pub albedo: [u8; 4],
    pub normal: [f16; 4],
    pub position: [f16; 4],
}

pub fn encode_multi(sample: &SurfaceSample) -> MultiTexel {
    let half = |v: Vec3| {
        [
            f16::from_f32(v.x),
            f16::from_f32(v.y),
            f16::from_f32(v.z),
            f16::ONE,
        ]
    };
    MultiTexel {
        albedo: unorm8x4(sample.albedo.extend(1.0)),
        normal: half(sample.normal),
        position: half(sample.position),
    }
}

pub fn decode_multi(texel: &MultiTexel) -> Option<SurfaceSample> {
    if texel.position[3].to_f32() == 0.0 {
        return None;
    }
    let vec = |t: [f16; 4]| Vec3::new(t[0].to_f32(), t[1].to_f32(), t[2].to_f32());
    Some(SurfaceSample {
        albedo: Vec3::from_array([0, 1, 2].map(|i| texel.albedo[i] as f32 / 255.0)),
        normal: vec(texel.normal).normalize(),
        position: vec(texel.position),
    })
}

/// `ndc_depth` is the fragment's depth in [0, 1] as the rasterizer produced it.
pub fn encode_packed(sample: &SurfaceSample, ndc_depth: f32) -> [u32; 4] {
    [
        pack_snorm2x16(encode_octahedral(sample.normal)),
        pack_unorm4x8(sample.albedo.extend(1.0)),
        ndc_depth.to_bits(),
        1,
    ]
}

/// Rebuilds the surface at framebuffer position `frag`.
pub fn decode_packed(
    texel: [u32; 4],
    frag: Vec2,
    screen_size: Vec2,
    inv_projection: Mat4,
) -> Option<SurfaceSample> {
    if texel[3] == 0 {
        return None;
    }
    let depth = f32::from_bits(texel[2]);
    let ndc = Vec2::new(
        frag.x / screen_size.x * 2.0 - 1.0,
        1.0 - frag.y / screen_size.y * 2.0,
    );
    let view = inv_projection * Vec4::new(ndc.x, ndc.y, depth, 1.0);

    Some(SurfaceSample {
        albedo: unpack_unorm4x8(texel[1]).truncate(),
        normal: decode_octahedral(unpack_snorm2x16(texel[0])),
        position: view.truncate() / view.w,
    })
}

fn unorm8x4(v: Vec4) -> [u8; 4] {
    v.to_array()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

pub fn pack_unorm4x8(v: Vec4) -> u32 {
    let [a, b, c, d] = unorm8x4(v);
    u32::from_le_bytes([a, b, c, d])
}

pub fn unpack_unorm4x8(bits: u32) -> Vec4 {
    Vec4::from_array(bits.to_le_bytes().map(|b| b as f32 / 255.0))
}

pub fn pack_snorm2x16(v: Vec2) -> u32 {
    let q = |c: f32| ((c.clamp(-1.0, 1.0) * 32767.0).round() as i16) as u16 as u32;
    q(v.x) | (q(v.y) << 16)
}

pub fn unpack_snorm2x16(bits: u32) -> Vec2 {
    let d = |h: u32| ((h as u16 as i16) as f32 / 32767.0).max(-1.0);
    Vec2::new(d(bits & 0xFFFF), d(bits >> 16))
}

pub fn encode_octahedral(n: Vec3) -> Vec2 {
    let p = n.truncate() / (n.x.abs() + n.y.abs() + n.z.abs());
    if n.z >= 0.0 {
        p
    } else {
        let sign = Vec2::new(
            if p.x >= 0.0 { 1.0 } else { -1.0 },
            if p.y >= 0.0 { 1.0 } else { -1.0 },
        );
        (Vec2::ONE - Vec2::new(p.y, p.x).abs()) * sign
    }
}

pub fn decode_octahedral(e: Vec2) -> Vec3 {
    let mut n = Vec3::new(e.x, e.y, 1.0 - e.x.abs() - e.y.abs());
    let t = (-n.z).max(0.0);
    n.x += if n.x >= 0.0 { -t } else { t };
    n.y += if n.y >= 0.0 { -t } else { t };
    n.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normals() -> Vec<Vec3> {
        let mut out = vec![
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        for i in 0..64 {
            let a = i as f32 * 0.37;
            out.push(Vec3::new(a.cos(), (a * 1.7).sin(), (a * 0.3).cos() - 0.5).normalize());
        }
        out
    }

    #[test]
    fn octahedral_normals_survive_snorm_quantization() {
        for n in normals() {
            let decoded = decode_octahedral(unpack_snorm2x16(pack_snorm2x16(encode_octahedral(n))));
            assert!(decoded.dot(n) > 0.9999, "{n} -> {decoded}");
        }
    }

    #[test]
    fn unorm_packing_is_exact_on_byte_values() {
        let albedo = Vec4::new(204.0, 153.0, 102.0, 255.0) / 255.0;
        assert_eq!(unpack_unorm4x8(pack_unorm4x8(albedo)), albedo);
        assert_eq!(pack_unorm4x8(Vec4::new(2.0, -1.0, 0.0, 1.0)) & 0xFFFF, 0x00FF);
    }

    #[test]
    fn snorm_clamps_minimum() {
        let bits = 0x8000_8000; // -32768 in both halves
        assert_eq!(unpack_snorm2x16(bits), Vec2::splat(-1.0));
    }

    #[test]
    fn background_pixels_decode_to_none() {
        let empty = MultiTexel {
            albedo: [0; 4],
            normal: [f16::ZERO; 4],
            position: [f16::ZERO; 4],
        };
        assert!(decode_multi(&empty).is_none());
        assert!(decode_packed([0; 4], Vec2::ZERO, Vec2::ONE, Mat4::IDENTITY).is_none());
    }

    #[test]
    fn formats_match_descriptors() {
        let extent = TargetExtent {
            width: 8,
            height: 8,
        };
        for packing in [GBufferPacking::MultiAttachment, GBufferPacking::Packed] {
            let descs = descriptors(packing, extent);
            let from_descs: Vec<_> = descs.iter().map(|d| d.format).collect();
            assert_eq!(from_descs, formats(packing));
            assert_eq!(color_targets(packing).len(), descs.len());
        }
        // 4 + 8 + 8 bytes against a single 16-byte texel
        assert_eq!(
            crate::texture::total_bytes(&descriptors(GBufferPacking::MultiAttachment, extent)),
            64 * 20
        );
        assert_eq!(
            crate::texture::total_bytes(&descriptors(GBufferPacking::Packed, extent)),
            64 * 16
        );
    }
}
