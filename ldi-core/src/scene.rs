//! C8: Scene Host.
//!
//! Owns the two textured quads (one per eye) that present the raycaster's
//! offscreen canvases into the outer XR scene: positioned, oriented, and
//! scaled to match the convergence plane every frame, with a 1 s fade-in
//! starting 200 ms after the first successful draw. Invisible outside
//! `Running` (§4.6).

use glam::{Mat4, Quat, Vec2, Vec3};
use ldi_gpu::{BindGroupLayout, Bindings, ColorTarget, Context, IndexBuffer, RenderPipelineBuilder, RenderPipelineHandle, RenderShader, Sampler, Texture, Uniform, VertexBuffer};

use crate::xr::ConvergencePlane;

const SCENE_SHADER: &str = include_str!("shaders/scene.wgsl");

/// Fade-in delay after the first successful draw, and its duration
/// (§4.6).
const FADE_DELAY_SECS: f32 = 0.2;
const FADE_DURATION_SECS: f32 = 1.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

const QUAD_ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRS,
    }
}

#[derive(encase::ShaderType)]
struct SceneUniforms {
    mvp: Mat4,
    opacity: f32,
}

/// World placement for one eye's quad, derived from the convergence
/// plane plus that eye's half-IPD offset (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct QuadTransform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec2,
}

impl QuadTransform {
    fn model_matrix(self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::new(self.scale.x, self.scale.y, 1.0), self.orientation, self.position)
    }
}

struct EyeQuad {
    transform: QuadTransform,
    uniforms: Uniform<SceneUniforms>,
}

/// Owns the shared quad mesh, pipeline, and per-eye placement/uniform
/// state. Rebuilds each eye's bind group whenever its source texture
/// changes (on canvas resize), otherwise reuses it across frames.
pub struct SceneHost {
    ctx: std::sync::Arc<Context>,
    sampler: Sampler,
    vertices: VertexBuffer<QuadVertex>,
    indices: IndexBuffer,
    pipeline: RenderPipelineHandle,
    left: EyeQuad,
    right: EyeQuad,
    visible: bool,
    first_draw_at: Option<f32>,
}

impl SceneHost {
    pub fn new(ctx: std::sync::Arc<Context>, target_format: wgpu::TextureFormat) -> Self {
        let sampler = Sampler::linear_clamp(&ctx);

        #[rustfmt::skip]
        let verts = [
            QuadVertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
            QuadVertex { position: [ 0.5, -0.5, 0.0], uv: [1.0, 1.0] },
            QuadVertex { position: [ 0.5,  0.5, 0.0], uv: [1.0, 0.0] },
            QuadVertex { position: [-0.5,  0.5, 0.0], uv: [0.0, 0.0] },
        ];
        let vertices = VertexBuffer::new(&ctx, &verts);
        let indices = IndexBuffer::new_u16(&ctx, &[0, 1, 2, 0, 2, 3]);

        let left_uniforms = Uniform::new(&ctx, &SceneUniforms { mvp: Mat4::IDENTITY, opacity: 0.0 });
        let right_uniforms = Uniform::new(&ctx, &SceneUniforms { mvp: Mat4::IDENTITY, opacity: 0.0 });

        // A throwaway 1x1 texture, used only to shape the pipeline's bind
        // group layout at build time; every real draw call builds its own
        // bind group against the eye's actual canvas texture.
        let layout_probe_texture = Texture::builder(1, 1).build(&ctx);
        let layout_probe = Bindings::new()
            .bind_frag(&left_uniforms)
            .bind_frag(&sampler)
            .bind_frag(&layout_probe_texture)
            .build(&ctx);
        let shader = RenderShader::new(&ctx, "ldi-scene-quad", SCENE_SHADER);
        let pipeline = RenderPipelineBuilder::new(&shader, ColorTarget::alpha_blend(target_format))
            .vertex_layout(quad_vertex_layout())
            .bind_group(&layout_probe)
            .build(&ctx);

        Self {
            ctx,
            sampler,
            vertices,
            indices,
            pipeline,
            left: EyeQuad {
                transform: QuadTransform { position: Vec3::ZERO, orientation: Quat::IDENTITY, scale: Vec2::ONE },
                uniforms: left_uniforms,
            },
            right: EyeQuad {
                transform: QuadTransform { position: Vec3::ZERO, orientation: Quat::IDENTITY, scale: Vec2::ONE },
                uniforms: right_uniforms,
            },
            visible: false,
            first_draw_at: None,
        }
    }

    /// Recomputes both quads' placement from the convergence plane and
    /// the fade-in opacity from elapsed time, per §4.6. Both quads share
    /// the plane's pose exactly — the WebXR "layer mask" concept this
    /// models picks an eye by compositor visibility, not by physically
    /// separating co-located quads, and each eye's canvas already bakes
    /// in its own stereo parallax (`XrSession::eye_render_camera`), so an
    /// extra world-space offset here would double it. `running` gates
    /// visibility: outside `Running`, both quads go invisible and the
    /// fade-in timer is not reset (it resumes where it left off on the
    /// next `Running` frame).
    pub fn update(&mut self, plane: ConvergencePlane, running: bool, t: f32) {
        self.visible = running;
        if !running {
            return;
        }
        if self.first_draw_at.is_none() {
            self.first_draw_at = Some(t);
        }
        let elapsed = t - self.first_draw_at.unwrap();
        let opacity = ((elapsed - FADE_DELAY_SECS) / FADE_DURATION_SECS).clamp(0.0, 1.0);

        let scale = Vec2::new(plane.width_world, plane.height_world);
        let transform = QuadTransform { position: plane.center, orientation: plane.orientation, scale };
        self.left.transform = transform;
        self.right.transform = transform;

        self.left.uniforms.write(&self.ctx, &SceneUniforms { mvp: self.left.transform.model_matrix(), opacity });
        self.right.uniforms.write(&self.ctx, &SceneUniforms { mvp: self.right.transform.model_matrix(), opacity });
    }

    /// Draws one eye's quad into `target`, sampling `eye_canvas` (that
    /// eye's raycast output). A no-op when the host is not currently
    /// visible (§4.6 "invisible outside Running").
    pub fn draw_eye(&self, target: &wgpu::TextureView, eye_canvas: &Texture, is_right: bool) {
        if !self.visible {
            return;
        }
        let quad = if is_right { &self.right } else { &self.left };
        let group = Bindings::new()
            .bind_frag(&quad.uniforms)
            .bind_frag(&self.sampler)
            .bind_frag(eye_canvas)
            .build(&self.ctx);
        self.pipeline
            .draw_mesh(&self.ctx, target, None, &[&group], &self.vertices, &self.indices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_ramps_from_zero_to_one_over_one_second() {
        let delay_done = FADE_DELAY_SECS + FADE_DURATION_SECS;
        let opacity_at = |elapsed: f32| ((elapsed - FADE_DELAY_SECS) / FADE_DURATION_SECS).clamp(0.0, 1.0);
        assert_eq!(opacity_at(0.0), 0.0);
        assert_eq!(opacity_at(FADE_DELAY_SECS), 0.0);
        assert!(opacity_at(FADE_DELAY_SECS + FADE_DURATION_SECS / 2.0) > 0.0);
        assert_eq!(opacity_at(delay_done), 1.0);
        assert_eq!(opacity_at(delay_done + 10.0), 1.0);
    }

    #[test]
    fn quad_model_matrix_places_quad_at_transform_position() {
        let tf = QuadTransform {
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::IDENTITY,
            scale: Vec2::new(2.0, 4.0),
        };
        let m = tf.model_matrix();
        let corner = m.transform_point3(Vec3::new(-0.5, -0.5, 0.0));
        assert!((corner - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-5);
    }
}
