use crate::texture::GpuTexture;

/// Flat-coloured surface. Albedo is stored linear in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
}

impl Material {
    pub fn from_rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            base_color: [r, g, b, 1.0],
        }
    }

    /// The texel a 1x1 RGBA8 texture stores for this material.
    pub fn texel(&self) -> [u8; 4] {
        self.base_color
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

pub struct GpuMaterial {
    pub bind_group: wgpu::BindGroup,
    _texture: GpuTexture,
}

impl GpuMaterial {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        material: &Material,
    ) -> Self {
        let texture = GpuTexture::from_rgba8(
            device,
            queue,
            &material.texel(),
            1,
            1,
            Some("Material Albedo Texture"),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });

        Self {
            bind_group,
            _texture: texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_quantizes_and_clamps() {
        assert_eq!(Material::from_rgb(0.8, 0.6, 0.4).texel(), [204, 153, 102, 255]);
        assert_eq!(Material::from_rgb(2.0, -1.0, 0.0).texel(), [255, 0, 0, 255]);
    }
}
