use crate::{Bindable, Buffer, Context, MemMapper};

/// A 2D texture plus its default view. Built through [`TextureBuilder`].
pub struct Texture {
    raw: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl Texture {
    #[must_use]
    pub fn builder(width: u32, height: u32) -> TextureBuilder {
        TextureBuilder {
            width,
            height,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            storage: false,
            render_target: false,
            readable: false,
            writable: true,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[inline]
    pub(crate) fn view(&self) -> wgpu::TextureView {
        self.raw.create_view(&wgpu::TextureViewDescriptor::default())
    }

    #[inline]
    pub(crate) fn raw_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Uploads tightly-packed RGBA8 pixel data covering the full extent.
    pub fn write(&self, ctx: &Context, rgba: &[u8]) {
        let bytes_per_pixel = 4;
        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.raw,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Copies the texture back to host memory as tightly-packed RGBA8,
    /// row padding (wgpu requires each row start on a 256-byte boundary)
    /// stripped out. Only valid for textures built with `.readable()`.
    pub fn read_rgba(&self, ctx: &Context) -> Vec<u8> {
        let bytes_per_pixel = 4u32;
        let unpadded_bpr = bytes_per_pixel * self.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bpr = unpadded_bpr.div_ceil(align) * align;

        let staging = Buffer::new_staging(ctx, u64::from(padded_bpr) * u64::from(self.height));

        let mut encoder = ctx.encoder();
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.raw,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: staging.raw(),
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.submit([encoder.finish()]);

        let padded = MemMapper::new(ctx).read(&staging);
        if padded_bpr == unpadded_bpr {
            return padded;
        }
        let mut out = Vec::with_capacity((unpadded_bpr * self.height) as usize);
        for row in padded.chunks(padded_bpr as usize) {
            out.extend_from_slice(&row[..unpadded_bpr as usize]);
        }
        out
    }
}

impl Bindable for Texture {
    fn binding_type(&self) -> wgpu::BindingType {
        wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        }
    }

    fn resource(&self) -> crate::bind::BindResource<'_> {
        crate::bind::BindResource::TextureView(self.view())
    }
}

/// Builds a [`Texture`], defaulting to an sRGB-free sampled texture that
/// the host can write to but the shader only reads.
pub struct TextureBuilder {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    storage: bool,
    render_target: bool,
    readable: bool,
    writable: bool,
}

impl TextureBuilder {
    #[must_use]
    pub const fn format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Allows the texture to be bound as a storage texture (compute
    /// writes, not used by the raycast fragment pipelines but kept for
    /// parity with the capture decode path).
    #[must_use]
    pub const fn storage(mut self) -> Self {
        self.storage = true;
        self
    }

    /// Allows the texture to be used as a render attachment.
    #[must_use]
    pub const fn render_target(mut self) -> Self {
        self.render_target = true;
        self
    }

    /// Allows copying the texture contents back to the host via
    /// [`Context`] readback helpers.
    #[must_use]
    pub const fn readable(mut self) -> Self {
        self.readable = true;
        self
    }

    /// The host never uploads data into this texture (it is populated
    /// purely by render passes).
    #[must_use]
    pub const fn not_writable(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn build(self, ctx: &Context) -> Texture {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        if self.writable {
            usage |= wgpu::TextureUsages::COPY_DST;
        }
        if self.storage {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        if self.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if self.readable {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let raw = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage,
            view_formats: &[],
        });
        let view = raw.create_view(&wgpu::TextureViewDescriptor::default());

        Texture {
            raw,
            view,
            format: self.format,
            width: self.width,
            height: self.height,
        }
    }
}
