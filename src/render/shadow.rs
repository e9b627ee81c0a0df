use glam::{Mat4, Vec3};

use super::LightParams;

/// Half-extent of the orthographic box the shadow camera covers.
const SHADOW_EXTENT: f32 = 8.0;

/// Orthographic view-projection of the directional light, aimed at the
/// scene origin.
pub fn light_view_proj(light: &LightParams) -> Mat4 {
    let eye = light.position;
    let direction = (Vec3::ZERO - eye).normalize_or_zero();
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, up);
    let projection = Mat4::orthographic_rh(
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        -SHADOW_EXTENT,
        SHADOW_EXTENT,
        0.1,
        light.shadow_far.max(1.0),
    );
    projection * view
}

/// Depth texture the shadow pass renders into and the scene pass samples
/// with a comparison sampler.
pub(super) struct ShadowMap {
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    _texture: wgpu::Texture,
}

impl ShadowMap {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn create(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: size.max(1),
                height: size.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Self {
            view,
            sampler,
            _texture: texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> LightParams {
        LightParams {
            position: Vec3::new(-2.0, 5.0, 4.0),
            color: Vec3::ONE,
            intensity: 3.0,
            shadow_far: 15.0,
            normal_bias: 0.05,
        }
    }

    #[test]
    fn origin_lands_inside_the_shadow_frustum() {
        let matrix = light_view_proj(&light());
        let clip = matrix * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn handles_a_light_directly_overhead() {
        let mut overhead = light();
        overhead.position = Vec3::new(0.0, 10.0, 0.0);
        let matrix = light_view_proj(&overhead);
        assert!(matrix.to_cols_array().iter().all(|v| v.is_finite()));
    }
}
