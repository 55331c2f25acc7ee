use crate::{Bindable, Context};

/// A texture sampler. LDI layer textures are always sampled with linear
/// filtering and clamped at the edges — the raycaster walks a continuous
/// ray through a discrete layer grid and must never wrap a sample around
/// to the opposite edge of the image.
pub struct Sampler {
    raw: wgpu::Sampler,
}

impl Sampler {
    /// Linear filtering, clamp-to-edge in both axes.
    pub fn linear_clamp(ctx: &Context) -> Self {
        let raw = ctx.device().create_sampler(&wgpu::SamplerDescriptor {
            label: None,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self { raw }
    }

    #[inline]
    pub(crate) fn raw(&self) -> &wgpu::Sampler {
        &self.raw
    }
}

impl Bindable for Sampler {
    fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
    }

    fn resource(&self) -> crate::bind::BindResource<'_> {
        crate::bind::BindResource::Sampler(&self.raw)
    }
}
