//! C3: Resource Manager.
//!
//! Decodes layer image/depth/mask bytes into pixel arrays, optionally
//! downscales them, composes depth+mask into the single RGBA texture the
//! raycaster samples, and (with the `gpu` feature) uploads the result to
//! a [`ldi_gpu::Texture`]. Textures are immutable once built; there is no
//! cache across captures, matching §4.2's contract.

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::capture::Layer;
use crate::{Error, Result};

/// What kind of blob is being decoded, for diagnostics only — decoding
/// itself is format-agnostic (PNG/JPEG, whatever `image` recognizes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    ColorRgba,
    DepthRgba,
    MaskRgba,
}

/// Decodes `blob_bytes` to an RGBA8 pixel buffer.
pub fn decode(blob_bytes: &[u8], kind: BlobKind) -> Result<RgbaImage> {
    let decoded = image::load_from_memory(blob_bytes).map_err(|e| {
        tracing::warn!(?kind, error = %e, "image decode failed");
        Error::ImageDecodeFailed(e)
    })?;
    Ok(decoded.to_rgba8())
}

/// Downscales `image` so its larger dimension is at most `max_side`,
/// preserving aspect ratio. The smaller dimension is derived by rounding
/// to the nearest integer, per §4.2. No-op if already within bounds.
pub fn downscale_if_over(image: &RgbaImage, max_side: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let controlling = w.max(h);
    if controlling <= max_side {
        return image.clone();
    }
    let scale = max_side as f64 / controlling as f64;
    let (new_w, new_h) = if w >= h {
        (max_side, (h as f64 * scale).round() as u32)
    } else {
        ((w as f64 * scale).round() as u32, max_side)
    };
    image::imageops::resize(image, new_w.max(1), new_h.max(1), image::imageops::FilterType::Triangle)
}

/// Composes a depth image and a mask into one RGBA image: RGB channels
/// come from `depth`, alpha from `mask`'s red channel. Both inputs must
/// share dimensions.
pub fn compose_masked_depth(depth: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage> {
    if depth.dimensions() != mask.dimensions() {
        return Err(Error::TextureAllocationFailed(format!(
            "depth/mask dimension mismatch: {:?} vs {:?}",
            depth.dimensions(),
            mask.dimensions()
        )));
    }
    let (w, h) = depth.dimensions();
    let mut out: RgbaImage = ImageBuffer::new(w, h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let d = depth.get_pixel(x, y);
        let m = mask.get_pixel(x, y);
        *px = Rgba([d[0], d[1], d[2], m[0]]);
    }
    Ok(out)
}

/// Decoded+composed pixel data for one layer, ready to upload as a pair
/// of GPU textures (`color`, `invZ`).
pub struct LayerPixels {
    pub color: RgbaImage,
    pub inv_z: RgbaImage,
}

/// Decodes a [`Layer`]'s blobs into the two pixel buffers the renderer
/// uploads as texture slots. If a mask is present, the color image's
/// alpha is overwritten from the mask (§3: "if a mask exists, alpha is
/// taken from the mask, not the image").
pub fn prepare_layer_pixels(layer: &Layer, max_side: Option<u32>) -> Result<LayerPixels> {
    let mut color = decode(&layer.image, BlobKind::ColorRgba)?;
    let mut inv_z = decode(&layer.inv_z_map.bytes, BlobKind::DepthRgba)?;

    if let Some(mask_bytes) = &layer.mask {
        let mut mask = decode(mask_bytes, BlobKind::MaskRgba)?;
        if mask.dimensions() != color.dimensions() {
            mask = image::imageops::resize(
                &mask,
                color.width(),
                color.height(),
                image::imageops::FilterType::Triangle,
            );
        }
        for (x, y, px) in color.enumerate_pixels_mut() {
            px[3] = mask.get_pixel(x, y)[0];
        }
        if mask.dimensions() != inv_z.dimensions() {
            let resized_mask = image::imageops::resize(
                &mask,
                inv_z.width(),
                inv_z.height(),
                image::imageops::FilterType::Triangle,
            );
            inv_z = compose_masked_depth(&inv_z, &resized_mask)?;
        } else {
            inv_z = compose_masked_depth(&inv_z, &mask)?;
        }
    }

    if let Some(max_side) = max_side {
        color = downscale_if_over(&color, max_side);
        inv_z = downscale_if_over(&inv_z, max_side);
    }

    Ok(LayerPixels { color, inv_z })
}

#[cfg(feature = "gpu")]
pub use gpu::{build_texture, LayerTextures};

#[cfg(feature = "gpu")]
mod gpu {
    use super::LayerPixels;
    use ldi_gpu::{Context, Texture};

    /// Uploads a pixel buffer as an immutable, linear-filtered,
    /// clamp-to-edge texture in `format`, per §4.2.
    pub fn build_texture(ctx: &Context, pixels: &image::RgbaImage, format: wgpu::TextureFormat) -> Texture {
        let texture = Texture::builder(pixels.width(), pixels.height()).format(format).build(ctx);
        texture.write(ctx, pixels.as_raw());
        texture
    }

    /// The two GPU textures a layer occupies: `color` and `invZ`.
    pub struct LayerTextures {
        pub color: Texture,
        pub inv_z: Texture,
    }

    impl LayerTextures {
        pub fn upload(ctx: &Context, pixels: &LayerPixels) -> Self {
            Self {
                color: build_texture(ctx, &pixels.color, wgpu::TextureFormat::Rgba8UnormSrgb),
                // invZ packs raw linear depth (rgb) and mask (alpha); an
                // sRGB view would gamma-decode both before raycast_layer
                // ever compares them, so this must stay Unorm (§3/§4.2).
                inv_z: build_texture(ctx, &pixels.inv_z, wgpu::TextureFormat::Rgba8Unorm),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        ImageBuffer::from_fn(w, h, |_, _| Rgba(rgba))
    }

    #[test]
    fn downscale_preserves_aspect_and_is_noop_when_small() {
        let img = solid(100, 50, [1, 2, 3, 4]);
        let untouched = downscale_if_over(&img, 200);
        assert_eq!(untouched.dimensions(), (100, 50));

        let scaled = downscale_if_over(&img, 40);
        assert_eq!(scaled.width(), 40);
        assert_eq!(scaled.height(), 20);
    }

    #[test]
    fn compose_masked_depth_takes_alpha_from_mask() {
        let depth = solid(2, 2, [10, 20, 30, 255]);
        let mask = solid(2, 2, [77, 0, 0, 0]);
        let composed = compose_masked_depth(&depth, &mask).expect("compose");
        let px = composed.get_pixel(0, 0);
        assert_eq!(*px, Rgba([10, 20, 30, 77]));
    }

    #[test]
    fn compose_masked_depth_rejects_dimension_mismatch() {
        let depth = solid(2, 2, [0, 0, 0, 0]);
        let mask = solid(3, 3, [0, 0, 0, 0]);
        assert!(compose_masked_depth(&depth, &mask).is_err());
    }
}
