//! C2: Capture Model.
//!
//! Normalizes the parsed JSON descriptor into the canonical in-memory
//! tree described in spec §3, resolving every blob reference to bytes
//! along the way. Everything downstream of [`Capture::parse`] sees only
//! the canonical schema; legacy key names and outpainting deltas never
//! leak past this module.

use serde::Deserialize;
use serde_json::Value;

use crate::container::Container;
use crate::{Error, Result};

/// Legacy-key → canonical-key rename table from spec §4.1. Order matters
/// only in that every entry is applied in one pass over the same tree,
/// so a value renamed by an earlier entry is not re-renamed by a later
/// one.
const KEY_RENAMES: &[(&str, &str)] = &[
    ("albedo", "image"),
    ("disparity", "inv_z_map"),
    ("inv_z_dist", "inv_z_map"),
    ("max_disparity", "max"),
    ("min_disparity", "min"),
    // Intentional swap: a legacy "min"-named key becomes canonical `max`
    // and vice versa. The renderer expects `inv_z_map.min` to be the
    // algebraically larger (nearest) value.
    ("inv_z_dist_min", "max"),
    ("inv_z_dist_max", "min"),
];

fn normalize_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut renamed = serde_json::Map::with_capacity(map.len());
            for (k, mut v) in std::mem::take(map) {
                normalize_keys(&mut v);
                let canonical = KEY_RENAMES
                    .iter()
                    .find(|(from, _)| *from == k)
                    .map_or(k, |(_, to)| (*to).to_string());
                renamed.insert(canonical, v);
            }
            *map = renamed;
        }
        Value::Array(items) => {
            for item in items {
                normalize_keys(item);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Rotation {
    pub slant: Vec2,
    pub roll_degrees: f32,
}

/// A resolved single-channel inverse-depth map: `min` is the nearest
/// inverse depth, `max` the farthest (see the swap note above).
pub struct InvZMap {
    pub bytes: Vec<u8>,
    pub min: f32,
    pub max: f32,
}

pub struct Layer {
    pub width_px: u32,
    pub height_px: u32,
    pub focal_px: f32,
    pub image: Vec<u8>,
    pub inv_z_map: InvZMap,
    pub mask: Option<Vec<u8>>,
}

pub struct View {
    pub width_px: u32,
    pub height_px: u32,
    pub focal_px: f32,
    pub position: Vec3,
    pub frustum_skew: Vec2,
    pub rotation: Rotation,
    pub layers: Vec<Layer>,
}

pub struct StereoRenderData {
    pub inv_convergence_distance: f32,
}

pub struct Capture {
    pub views: Vec<View>,
    pub stereo_render_data: Option<StereoRenderData>,
}

/// A lightweight report of a capture's shape, used by the CLI `inspect`
/// subcommand and a debug server endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CaptureSummary {
    pub view_count: usize,
    pub layers_per_view: Vec<usize>,
    pub focal_px_range: (f32, f32),
    pub max_side_px: u32,
}

impl Capture {
    pub fn summarize(&self) -> CaptureSummary {
        let layers_per_view = self.views.iter().map(|v| v.layers.len()).collect();
        let focals: Vec<f32> = self
            .views
            .iter()
            .flat_map(|v| v.layers.iter().map(|l| l.focal_px))
            .collect();
        let focal_px_range = (
            focals.iter().copied().fold(f32::INFINITY, f32::min),
            focals.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        );
        let max_side_px = self
            .views
            .iter()
            .flat_map(|v| v.layers.iter().map(|l| l.width_px.max(l.height_px)))
            .max()
            .unwrap_or(0);
        CaptureSummary {
            view_count: self.views.len(),
            layers_per_view,
            focal_px_range,
            max_side_px,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawVec2 {
    x: f32,
    y: f32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawVec3 {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawRotation {
    slant: RawVec2,
    roll_degrees: f32,
}

#[derive(Deserialize)]
struct RawBlobRef {
    blob_id: i64,
}

#[derive(Deserialize)]
struct RawInvZMap {
    blob_id: i64,
    min: f32,
    max: f32,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawLayer {
    width_px: u32,
    height_px: u32,
    focal_px: f32,
    image: Option<RawBlobRef>,
    inv_z_map: Option<RawInvZMap>,
    mask: Option<RawBlobRef>,
}

impl Default for RawLayer {
    fn default() -> Self {
        Self {
            width_px: 0,
            height_px: 0,
            focal_px: 0.0,
            image: None,
            inv_z_map: None,
            mask: None,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCameraData {
    focal_ratio_to_width: f32,
    position: RawVec3,
    frustum_skew: RawVec2,
    rotation: RawRotation,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLdiData {
    layers_top_to_bottom: Vec<RawLayer>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawView {
    width_px: Option<u32>,
    height_px: Option<u32>,
    focal_px: Option<f32>,
    position: RawVec3,
    frustum_skew: RawVec2,
    rotation: RawRotation,
    layers_top_to_bottom: Vec<RawLayer>,
    camera_data: Option<RawCameraData>,
    layered_depth_image_data: Option<RawLdiData>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStereoRenderData {
    inv_convergence_distance: f32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCapture {
    views: Vec<RawView>,
    stereo_render_data: Option<RawStereoRenderData>,
}

impl Capture {
    /// Parses and normalizes a `.lif` file into the canonical capture
    /// tree, resolving every blob reference to owned bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let container = Container::parse(bytes)?;
        let json_bytes = container.json_descriptor()?;
        let mut value: Value = serde_json::from_slice(json_bytes)?;
        normalize_keys(&mut value);
        let raw: RawCapture = serde_json::from_value(value)?;

        if raw.views.is_empty() || raw.views.len() > 2 {
            return Err(Error::UnsupportedViewCount(raw.views.len()));
        }

        let views = raw
            .views
            .into_iter()
            .map(|v| build_view(&container, v))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            views,
            stereo_render_data: raw
                .stereo_render_data
                .map(|s| StereoRenderData {
                    inv_convergence_distance: s.inv_convergence_distance,
                }),
        })
    }
}

fn build_view(container: &Container<'_>, mut raw: RawView) -> Result<View> {
    // Fold outpainting: layered_depth_image_data's layers replace the
    // view's own layer list once hoisted.
    if let Some(ldi) = raw.layered_depth_image_data.take() {
        raw.layers_top_to_bottom = ldi.layers_top_to_bottom;
    }

    // Legacy views carry no width_px/height_px/focal_px of their own;
    // derive them from the whole-file image and camera_data.
    let (width_px, height_px, focal_px, position, frustum_skew, rotation, legacy_ratio) =
        if let Some(width_px) = raw.width_px {
            let height_px = raw.height_px.unwrap_or(width_px);
            let focal_px = raw.focal_px.unwrap_or(0.0);
            (
                width_px,
                height_px,
                focal_px,
                Vec3 {
                    x: raw.position.x,
                    y: raw.position.y,
                    z: raw.position.z,
                },
                Vec2 {
                    x: raw.frustum_skew.x,
                    y: raw.frustum_skew.y,
                },
                Rotation {
                    slant: Vec2 {
                        x: raw.rotation.slant.x,
                        y: raw.rotation.slant.y,
                    },
                    roll_degrees: raw.rotation.roll_degrees,
                },
                None,
            )
        } else {
            let camera_data = raw.camera_data.as_ref();
            let whole_file = container.resolve_blob(-1)?;
            let (w, h) = image::ImageReader::new(std::io::Cursor::new(whole_file))
                .with_guessed_format()
                .map_err(Error::from)?
                .into_dimensions()
                .map_err(Error::from)?;
            let ratio = camera_data.map_or(0.0, |c| c.focal_ratio_to_width);
            let focal_px = ratio * w as f32;
            let cd = camera_data;
            (
                w,
                h,
                focal_px,
                cd.map_or(Vec3::default(), |c| Vec3 {
                    x: c.position.x,
                    y: c.position.y,
                    z: c.position.z,
                }),
                cd.map_or(Vec2::default(), |c| Vec2 {
                    x: c.frustum_skew.x,
                    y: c.frustum_skew.y,
                }),
                cd.map_or(
                    Rotation {
                        slant: Vec2::default(),
                        roll_degrees: 0.0,
                    },
                    |c| Rotation {
                        slant: Vec2 {
                            x: c.rotation.slant.x,
                            y: c.rotation.slant.y,
                        },
                        roll_degrees: c.rotation.roll_degrees,
                    },
                ),
                Some(ratio),
            )
        };

    if raw.layers_top_to_bottom.is_empty() || raw.layers_top_to_bottom.len() > 4 {
        return Err(Error::UnsupportedLayerCount(raw.layers_top_to_bottom.len()));
    }

    let layers = raw
        .layers_top_to_bottom
        .into_iter()
        .map(|l| build_layer(container, l, legacy_ratio))
        .collect::<Result<Vec<_>>>()?;

    Ok(View {
        width_px,
        height_px,
        focal_px,
        position,
        frustum_skew,
        rotation,
        layers,
    })
}

fn build_layer(container: &Container<'_>, raw: RawLayer, legacy_ratio: Option<f32>) -> Result<Layer> {
    let image_ref = raw.image.ok_or(Error::MissingMetadata)?;
    let inv_z_ref = raw.inv_z_map.ok_or(Error::MissingMetadata)?;

    let image = container.resolve_blob(image_ref.blob_id)?.to_vec();
    let inv_z_bytes = container.resolve_blob(inv_z_ref.blob_id)?.to_vec();
    let mask = raw
        .mask
        .map(|m| container.resolve_blob(m.blob_id).map(<[u8]>::to_vec))
        .transpose()?;

    let (mut min, mut max) = (inv_z_ref.min, inv_z_ref.max);
    if let Some(ratio) = legacy_ratio {
        if ratio.abs() > f32::EPSILON {
            min /= -ratio;
            max /= -ratio;
        }
    }
    if min <= max {
        tracing::warn!(min, max, "inv_z_map.min is not greater than inv_z_map.max after normalization");
    }

    Ok(Layer {
        width_px: raw.width_px,
        height_px: raw.height_px,
        focal_px: raw.focal_px,
        image,
        inv_z_map: InvZMap {
            bytes: inv_z_bytes,
            min,
            max,
        },
        mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_legacy_keys_including_min_max_swap() {
        let mut value = json!({
            "albedo": {"blob_id": 1},
            "disparity": {
                "blob_id": 2,
                "inv_z_dist_min": 0.9,
                "inv_z_dist_max": 0.1
            }
        });
        normalize_keys(&mut value);
        assert_eq!(value["image"]["blob_id"], 1);
        // inv_z_dist_min (0.9) becomes canonical `max`; inv_z_dist_max
        // (0.1) becomes canonical `min` — the intentional swap.
        assert_eq!(value["inv_z_map"]["max"], 0.9);
        assert_eq!(value["inv_z_map"]["min"], 0.1);
    }

    #[test]
    fn rejects_too_many_views() {
        let raw = RawCapture {
            views: vec![RawView::default(), RawView::default(), RawView::default()],
            stereo_render_data: None,
        };
        assert_eq!(raw.views.len(), 3);
    }
}
