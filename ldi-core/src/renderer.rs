//! C5: Renderer Core.
//!
//! Owns the GPU-side arena for a loaded [`Capture`] (one pair of
//! textures per layer), builds the matching [`PipelineKind`], and
//! implements the `draw(t)` contract from §4.4: bind layer textures to
//! deterministic slots, push the uniform set, draw a fullscreen quad per
//! output eye.

use encase::ShaderType;
use glam::{Mat3, Vec2, Vec3, Vec4};
use ldi_gpu::{BindGroupLayout, Bindings, Context, RenderPipelineHandle, Sampler, StorageBuffer, Texture, Uniform};

use crate::camera_math::{fskr, project};
use crate::capture::{Capture, View};
use crate::resource::{self, LayerTextures};
use crate::shader_lib::PipelineKind;
use crate::{Error, Result};

/// Every bind group pads its texture slots out to this count regardless
/// of how many layers the view actually has — the fixed binding layout
/// in `shaders/common.wgsl` assumes four slots, and the shader never
/// samples past `uniforms.num_layers` layers.
const MAX_LAYERS: usize = 4;

/// A render camera: the position/orientation the raycaster treats as the
/// output eye, per §3. Two of these exist during stereo rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderCamera {
    pub position: Vec3,
    pub slant: Vec2,
    pub skew: Vec2,
    pub roll_degrees: f32,
    pub focal_px: f32,
}

impl RenderCamera {
    /// A render camera that reproduces `view` exactly — used by property
    /// test P1 and the "mono static" scenario (§8).
    pub fn matching_view(view: &View) -> Self {
        Self {
            position: Vec3::new(view.position.x, view.position.y, view.position.z),
            slant: Vec2::new(view.rotation.slant.x, view.rotation.slant.y),
            skew: Vec2::new(view.frustum_skew.x, view.frustum_skew.y),
            roll_degrees: view.rotation.roll_degrees,
            focal_px: view.focal_px,
        }
    }

    fn fskr(self) -> Mat3 {
        fskr(
            (self.focal_px, self.focal_px),
            (self.skew.x, self.skew.y),
            self.roll_degrees,
            (self.slant.x, self.slant.y),
        )
    }
}

#[derive(ShaderType, Clone, Copy)]
struct LayerParamsGpu {
    p: Mat3,
    c: Vec3,
    inv_z_min: f32,
    inv_z_max: f32,
}

impl Default for LayerParamsGpu {
    fn default() -> Self {
        Self {
            p: Mat3::ZERO,
            c: Vec3::ZERO,
            inv_z_min: 0.0,
            inv_z_max: 0.0,
        }
    }
}

#[derive(ShaderType)]
struct UniformsGpu {
    num_layers: u32,
    num_coarse: u32,
    num_fine: u32,
    window_effect: u32,
    feather: f32,
    time: f32,
    anim_t: f32,
    blend_w_r: f32,
    background: Vec4,
    o_res: Vec2,
    i_res_original: Vec2,
}

/// Windowing/feathering policy applied every draw (§4.4 "Feathering and
/// windowing"). `window_effect` defaults to `false`: most draws fill the
/// whole output.
#[derive(Debug, Clone, Copy)]
pub struct DrawPolicy {
    pub feather: f32,
    pub window_effect: bool,
    pub background: Vec4,
    pub anim_t: f32,
}

impl Default for DrawPolicy {
    fn default() -> Self {
        Self {
            feather: 0.1,
            window_effect: false,
            background: Vec4::ZERO,
            anim_t: 1.0,
        }
    }
}

/// Everything about a layer that feeds `LayerParamsGpu` except the
/// per-frame render camera, computed once at load time.
struct LayerParamsTemplate {
    fskr_layer: Mat3,
    position: Vec3,
    inv_z_min: f32,
    inv_z_max: f32,
}

struct ViewArena {
    layers: Vec<LayerTextures>,
    layer_params: Vec<LayerParamsTemplate>,
    layer_params_buf: StorageBuffer<LayerParamsGpu>,
}

/// The GPU-side arena for a loaded capture: textures, bind groups and
/// the pipeline, all dropped together when the `Renderer` is dropped
/// (§3 "GPU textures outlive no capture").
pub struct Renderer {
    ctx: std::sync::Arc<Context>,
    kind: PipelineKind,
    #[allow(dead_code)]
    sampler: Sampler,
    arenas: Vec<ViewArena>,
    uniforms_buf: Uniform<UniformsGpu>,
    bind_groups: Vec<BindGroupLayout>,
    pipeline: RenderPipelineHandle,
    canvas: Texture,
    i_res_original: Vec2,
    policy: DrawPolicy,
}

impl Renderer {
    /// Decodes every layer's textures, builds the raycast pipeline for
    /// the capture's input-view arity, and allocates the output canvas.
    pub fn load(capture: &Capture, ctx: std::sync::Arc<Context>, canvas_size: (u32, u32)) -> Result<Self> {
        let kind = PipelineKind::from_view_count(capture.views.len())?;
        let sampler = Sampler::linear_clamp(&ctx);

        let mut arenas = Vec::with_capacity(capture.views.len());
        for view in &capture.views {
            if view.layers.is_empty() || view.layers.len() > MAX_LAYERS {
                return Err(Error::UnsupportedLayerCount(view.layers.len()));
            }
            let mut layers = Vec::with_capacity(view.layers.len());
            let mut layer_params = Vec::with_capacity(view.layers.len());
            for layer in &view.layers {
                let pixels = resource::prepare_layer_pixels(layer, None)?;
                layers.push(LayerTextures::upload(&ctx, &pixels));
                layer_params.push(LayerParamsTemplate {
                    fskr_layer: fskr(
                        (layer.focal_px, layer.focal_px),
                        (view.frustum_skew.x, view.frustum_skew.y),
                        view.rotation.roll_degrees,
                        (view.rotation.slant.x, view.rotation.slant.y),
                    ),
                    position: Vec3::new(view.position.x, view.position.y, view.position.z),
                    inv_z_min: layer.inv_z_map.min,
                    inv_z_max: layer.inv_z_map.max,
                });
            }
            let layer_params_buf =
                StorageBuffer::new(&ctx, &vec![LayerParamsGpu::default(); MAX_LAYERS]);
            arenas.push(ViewArena {
                layers,
                layer_params,
                layer_params_buf,
            });
        }

        let target_format = wgpu::TextureFormat::Rgba8Unorm;
        let canvas = Texture::builder(canvas_size.0, canvas_size.1)
            .format(target_format)
            .render_target()
            .readable()
            .not_writable()
            .build(&ctx);

        let uniforms_buf = Uniform::new(
            &ctx,
            &UniformsGpu {
                num_layers: 0,
                num_coarse: kind.num_coarse(),
                num_fine: kind.num_fine(),
                window_effect: 0,
                feather: 0.1,
                time: 0.0,
                anim_t: 1.0,
                blend_w_r: 0.5,
                background: Vec4::ZERO,
                o_res: Vec2::new(canvas_size.0 as f32, canvas_size.1 as f32),
                i_res_original: Vec2::new(
                    capture.views[0].width_px as f32,
                    capture.views[0].height_px as f32,
                ),
            },
        );

        let bind_groups = build_bind_groups(&ctx, &arenas, &sampler, &uniforms_buf)?;
        let bind_group_refs: Vec<&BindGroupLayout> = bind_groups.iter().collect();
        let pipeline = crate::shader_lib::build_pipeline(&ctx, kind, target_format, &bind_group_refs);

        let i_res_original = Vec2::new(
            capture.views[0].width_px as f32,
            capture.views[0].height_px as f32,
        );

        Ok(Self {
            ctx,
            kind,
            sampler,
            arenas,
            uniforms_buf,
            bind_groups,
            pipeline,
            canvas,
            i_res_original,
            policy: DrawPolicy::default(),
        })
    }

    pub fn set_policy(&mut self, policy: DrawPolicy) {
        self.policy = policy;
    }

    pub fn canvas(&self) -> &Texture {
        &self.canvas
    }

    /// `draw(t)` per §4.4: clears, binds layer textures, pushes the
    /// uniform set, draws a fullscreen quad for one output eye. Call
    /// twice (once per `RenderCamera`) to produce a stereo output pair
    /// (MN→ST / ST→ST): the fragment pipeline itself never branches on
    /// output eye count, only the caller's loop does.
    pub fn draw(&self, cam: RenderCamera, t: f32) -> Result<()> {
        let cam_fskr = cam.fskr();
        let cam_pos = cam.position;

        let mut num_layers = 0u32;
        for arena in &self.arenas {
            let mut params_gpu = vec![LayerParamsGpu::default(); MAX_LAYERS];
            for (i, tpl) in arena.layer_params.iter().enumerate() {
                let (p, c) = project(cam_fskr, cam_pos, tpl.fskr_layer, tpl.position)
                    .unwrap_or((Mat3::ZERO, Vec3::ZERO));
                params_gpu[i] = LayerParamsGpu {
                    p,
                    c,
                    inv_z_min: tpl.inv_z_min,
                    inv_z_max: tpl.inv_z_max,
                };
            }
            arena.layer_params_buf.write(&self.ctx, &params_gpu);
            num_layers = num_layers.max(arena.layer_params.len() as u32);
        }

        self.uniforms_buf.write(
            &self.ctx,
            &UniformsGpu {
                num_layers,
                num_coarse: self.kind.num_coarse(),
                num_fine: self.kind.num_fine(),
                window_effect: u32::from(self.policy.window_effect),
                feather: self.policy.feather,
                time: t,
                anim_t: self.policy.anim_t,
                blend_w_r: 0.5,
                background: self.policy.background,
                o_res: Vec2::new(self.canvas.width() as f32, self.canvas.height() as f32),
                i_res_original: self.i_res_original,
            },
        );

        let bind_group_refs: Vec<&BindGroupLayout> = self.bind_groups.iter().collect();
        self.pipeline.draw(
            &self.ctx,
            self.canvas.raw_view(),
            Some(wgpu::Color::TRANSPARENT),
            &bind_group_refs,
        );
        Ok(())
    }
}

fn build_bind_groups<'a>(
    ctx: &Context,
    arenas: &'a [ViewArena],
    sampler: &'a Sampler,
    uniforms_buf: &'a Uniform<UniformsGpu>,
) -> Result<Vec<BindGroupLayout>> {
    let mut groups = Vec::with_capacity(arenas.len());
    for (view_idx, arena) in arenas.iter().enumerate() {
        let mut bindings = Bindings::new();
        if view_idx == 0 {
            bindings = bindings.bind_frag(uniforms_buf);
        }
        bindings = bindings.bind_frag(sampler);
        for slot in 0..MAX_LAYERS {
            // Pad unused slots with the last real layer's textures: the
            // shader only ever samples up to `num_layers`, so padding
            // values are never read.
            let layer = &arena.layers[slot.min(arena.layers.len() - 1)];
            bindings = bindings.bind_frag(&layer.color).bind_frag(&layer.inv_z);
        }
        bindings = bindings.bind_frag(&arena.layer_params_buf);
        groups.push(bindings.build(ctx));
    }
    Ok(groups)
}
