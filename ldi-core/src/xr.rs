//! C7: XR Session Manager — the convergence-plane scheduler.
//!
//! Every frame, given the two XR sub-cameras, derives a virtual display
//! plane ("convergence plane"), sizes the per-eye offscreen canvases, and
//! turns the plane plus the current eye poses into the pair of
//! [`RenderCamera`]s the raycaster consumes. Holds no GPU state itself —
//! canvas re-creation is the caller's job, triggered by watching
//! [`XrSession::canvas_size`] for a change.

use glam::{EulerRot, Quat, Vec2, Vec3};

use crate::capture::{Capture, View};
use crate::renderer::RenderCamera;

/// Longest side a VR-mode canvas is allowed to reach (§4.5).
const MAX_TEX: u32 = 1920;

/// A physical-display pixel constant used by the VR-mode fallback
/// distance formula (§4.5 step 5); empirically chosen by the reference
/// implementation, not derived.
const VR_FALLBACK_CONSTANT: f32 = 0.063;

/// Below this magnitude the plane-solver denominator is treated as
/// singular and the scheduler falls back to VR-mode geometry (§4.5
/// step 3, §7 "one documented fallback case").
const DENOM_SINGULAR_THRESHOLD: f32 = 1e-4;

/// One XR sub-camera's pose and projection, as handed in by the host
/// XR runtime each frame.
#[derive(Debug, Clone, Copy)]
pub struct XrCamera {
    pub position: Vec3,
    pub orientation: Quat,
    /// Column-major 4x4 projection matrix elements, indexed the way
    /// WebXR exposes `XRView.projectionMatrix` (`proj[col * 4 + row]`).
    /// Only `m00`, `m05`, `m08`, `m09` are read (§4.5 step 1).
    pub proj: [f32; 16],
}

impl XrCamera {
    fn tan_left(&self) -> f32 {
        -(1.0 - self.proj[8]) / self.proj[0]
    }
    fn tan_right(&self) -> f32 {
        (1.0 + self.proj[8]) / self.proj[0]
    }
    fn tan_down(&self) -> f32 {
        -(1.0 - self.proj[9]) / self.proj[5]
    }
    fn tan_up(&self) -> f32 {
        (1.0 + self.proj[9]) / self.proj[5]
    }
}

/// Left controller's gamepad state; only button index 4 (the reset
/// trigger, §4.5/§6) is consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct GamepadState {
    pub buttons_pressed: [bool; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConvergenceMode {
    ThreeD,
    Vr,
}

/// The virtual display plane the raycaster's stereo output is projected
/// against (§3).
#[derive(Debug, Clone, Copy)]
pub struct ConvergencePlane {
    pub center: Vec3,
    pub orientation: Quat,
    pub width_world: f32,
    pub height_world: f32,
    mode: ConvergenceMode,
}

fn pos_local(plane_center: Vec3, plane_orientation: Quat, world_pos: Vec3) -> Vec3 {
    plane_orientation.conjugate() * (world_pos - plane_center)
}

/// Solves for the convergence plane given the two eye poses and the
/// capture's near-inverse-depth/focus parameters (§4.5 steps 1-5).
fn derive_convergence_plane(l: &XrCamera, r: &XrCamera, inv_z_min: f32, focus: f32, view: &View) -> ConvergencePlane {
    let center = (l.position + r.position) / 2.0;
    let to_local = |p: Vec3| l.orientation.conjugate() * (p - center);

    let l_local = to_local(l.position);
    let r_local = to_local(r.position);

    let (x0, z0) = (l_local.x, l_local.z);
    let (x1, z1) = (r_local.x, r_local.z);
    let (l0, r0, d0, u0) = (l.tan_left(), l.tan_right(), l.tan_down(), l.tan_up());
    let (l1, r1) = (r.tan_left(), r.tan_right());

    let denom = (r1 - l1) - (r0 - l0);
    let mirror_symmetric = (l0 - r1).abs() < DENOM_SINGULAR_THRESHOLD && (r0 - l1).abs() < DENOM_SINGULAR_THRESHOLD;

    if denom.abs() < DENOM_SINGULAR_THRESHOLD || mirror_symmetric {
        return vr_fallback_plane(l, center, inv_z_min, focus, view);
    }

    let z_d = (2.0 * (x1 - x0) + z1 * (r1 - l1) - z0 * (r0 - l0)) / denom;
    let x_d = x0 - (r0 - l0) * (z_d - z0) / 2.0;
    let y_d = l_local.y - (u0 - d0) * (z_d - z0) / 2.0;
    let width_world = (z0 - z_d) * (l0 + r0);
    let height_world = (z0 - z_d) * (u0 + d0);

    let local_point = Vec3::new(x_d, y_d, z_d);
    let world_center = center + l.orientation * local_point;

    ConvergencePlane {
        center: world_center,
        orientation: l.orientation,
        width_world: width_world.abs(),
        height_world: height_world.abs(),
        mode: ConvergenceMode::ThreeD,
    }
}

fn vr_fallback_plane(l: &XrCamera, center: Vec3, inv_z_min: f32, focus: f32, view: &View) -> ConvergencePlane {
    let d = VR_FALLBACK_CONSTANT / (inv_z_min * focus);
    let plane_center = center + l.orientation * (Vec3::NEG_Z * d);

    let width_world = view.width_px as f32 / view.focal_px * d;
    let aspect = view.height_px as f32 / view.width_px as f32;
    let height_world = width_world * aspect;

    // Remove roll: decompose via Y-X-Z Euler order and zero the Z term.
    let (yaw, pitch, _roll) = l.orientation.to_euler(EulerRot::YXZ);
    let orientation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);

    ConvergencePlane {
        center: plane_center,
        orientation,
        width_world,
        height_world,
        mode: ConvergenceMode::Vr,
    }
}

/// One eye's tracking baseline, reseeded whenever the plane resets.
#[derive(Debug, Clone, Copy, Default)]
struct EyeBaseline {
    initial_y: f32,
    initial_z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Initializing,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XrState {
    Idle,
    SessionRequested,
    SessionActive(RunPhase),
    SessionEnded,
}

/// Outcome of [`XrSession::on_frame`]. `Initializing` carries no render
/// cameras: spec.md's state machine gives the first frame after a
/// session request to size canvases and seed the convergence plane
/// without drawing anything.
#[derive(Debug, Clone, Copy)]
pub enum XrFrame {
    Initializing,
    Running(RenderCamera, RenderCamera),
}

/// Drives the per-frame convergence-plane scheduler described in §4.5.
/// Owns no GPU resources; the caller watches [`XrSession::canvas_size`]
/// to know when to re-create per-eye render targets.
pub struct XrSession {
    state: XrState,
    plane: Option<ConvergencePlane>,
    canvas_size: (u32, u32),
    ipd: f32,
    baseline: EyeBaseline,
    reset_button_prev: bool,
    view_width_px: u32,
    view_height_px: u32,
    view_focal_px: f32,
    inv_z_min: f32,
    focus: f32,
}

impl XrSession {
    /// Requests a session for `capture`'s first view. `focus` is the
    /// capture's `stereo_render_data.inv_convergence_distance`, defaulting
    /// to 1.0 when the capture carries none (an Open Question the source
    /// leaves implicit; see the design ledger).
    pub fn request(capture: &Capture) -> crate::Result<Self> {
        let view = capture.views.first().ok_or(crate::Error::MissingMetadata)?;
        let inv_z_min = view.layers.first().map_or(1.0, |l| l.inv_z_map.min);
        let focus = capture.stereo_render_data.as_ref().map_or(1.0, |s| s.inv_convergence_distance);

        Ok(Self {
            state: XrState::SessionRequested,
            plane: None,
            canvas_size: (view.width_px, view.height_px),
            ipd: 0.0,
            baseline: EyeBaseline::default(),
            reset_button_prev: false,
            view_width_px: view.width_px,
            view_height_px: view.height_px,
            view_focal_px: view.focal_px,
            inv_z_min,
            focus,
        })
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn plane(&self) -> Option<ConvergencePlane> {
        self.plane
    }

    /// Forces a convergence-plane recompute and re-seeds tracking, as if
    /// the reset trigger had just fired. Exposed directly so callers
    /// (and tests) don't have to fabricate a gamepad edge.
    pub fn reset(&mut self, l: XrCamera, r: XrCamera) {
        let plane = derive_convergence_plane(&l, &r, self.inv_z_min, self.focus, &view_from_session(self));
        self.reseed(plane, l, r);
    }

    fn reseed(&mut self, plane: ConvergencePlane, l: XrCamera, r: XrCamera) {
        let l_local = pos_local(plane.center, plane.orientation, l.position);
        let r_local = pos_local(plane.center, plane.orientation, r.position);
        self.ipd = (l_local - r_local).length().max(f32::EPSILON);

        let head_world = (l.position + r.position) / 2.0;
        let head_local = pos_local(plane.center, plane.orientation, head_world);
        self.baseline = EyeBaseline {
            initial_y: head_local.y,
            initial_z: head_local.z,
        };

        self.canvas_size = canvas_size_for(plane, self.view_width_px, self.view_height_px, self.canvas_size);
        self.plane = Some(plane);
    }

    /// Advances the scheduler by one frame: processes the reset edge,
    /// (re)computes the convergence plane on `Initializing`/reset, and
    /// derives both render cameras (§4.5 "per-eye render-camera update").
    /// Per spec.md's state machine, `Initializing` lasts exactly one
    /// frame — it sizes/seeds the plane but emits no draw; only once the
    /// session has reached `Running` does a frame carry render cameras.
    pub fn on_frame(&mut self, l: XrCamera, r: XrCamera, gamepad: GamepadState) -> crate::Result<XrFrame> {
        let was_requested = self.state == XrState::SessionRequested;
        match self.state {
            XrState::SessionRequested => {
                self.state = XrState::SessionActive(RunPhase::Initializing);
            }
            XrState::SessionEnded => return Err(crate::Error::XrNotSupported),
            _ => {}
        }

        let reset_edge = gamepad.buttons_pressed.get(4).copied().unwrap_or(false) && !self.reset_button_prev;
        self.reset_button_prev = gamepad.buttons_pressed.get(4).copied().unwrap_or(false);

        let needs_plane = self.plane.is_none() || reset_edge;
        if needs_plane {
            let view = view_from_session(self);
            let plane = derive_convergence_plane(&l, &r, self.inv_z_min, self.focus, &view);
            self.reseed(plane, l, r);
        }

        if was_requested {
            return Ok(XrFrame::Initializing);
        }

        if self.state == XrState::SessionActive(RunPhase::Initializing) {
            self.state = XrState::SessionActive(RunPhase::Running);
        }

        let plane = self.plane.expect("plane seeded above");
        let cam_l = self.eye_render_camera(plane, l);
        let cam_r = self.eye_render_camera(plane, r);
        Ok(XrFrame::Running(cam_l, cam_r))
    }

    /// §4.5 "per-eye render-camera update".
    fn eye_render_camera(&self, plane: ConvergencePlane, eye: XrCamera) -> RenderCamera {
        let local = pos_local(plane.center, plane.orientation, eye.position);
        let ipd = self.ipd;

        let pos_x = local.x / ipd;
        let pos_y = (self.baseline.initial_y - local.y) / ipd;
        let pos_z = (self.baseline.initial_z - local.z) / ipd;

        let invd = self.focus * self.inv_z_min;
        let denom = 1.0 - pos_z * invd;
        let sk_x = if denom.abs() > f32::EPSILON { -pos_x * invd / denom } else { 0.0 };
        let sk_y = if denom.abs() > f32::EPSILON { -pos_y * invd / denom } else { 0.0 };

        let viewport_scale = viewport_scale_for(self.canvas_size, (self.view_width_px, self.view_height_px));
        let focal_px = self.view_focal_px * viewport_scale * (1.0 - pos_z * invd).max(0.0);

        RenderCamera {
            position: Vec3::new(pos_x, pos_y, pos_z),
            slant: Vec2::ZERO,
            skew: Vec2::new(sk_x, sk_y),
            roll_degrees: 0.0,
            focal_px,
        }
    }

    pub fn pause(&mut self) {
        if let XrState::SessionActive(_) = self.state {
            self.state = XrState::SessionActive(RunPhase::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.state == XrState::SessionActive(RunPhase::Paused) {
            self.state = XrState::SessionActive(RunPhase::Running);
        }
    }

    /// §4.5 "on `sessionend`, release all per-eye canvases and the plane."
    pub fn end(&mut self) {
        self.state = XrState::SessionEnded;
        self.plane = None;
    }
}

/// `viewport scale` per the glossary: ratio between the output
/// resolution's short side and the view's short side.
fn viewport_scale_for(canvas: (u32, u32), view: (u32, u32)) -> f32 {
    let out_short = canvas.0.min(canvas.1) as f32;
    let in_short = view.0.min(view.1) as f32;
    if in_short <= 0.0 {
        1.0
    } else {
        out_short / in_short
    }
}

fn canvas_size_for(plane: ConvergencePlane, view_w: u32, view_h: u32, viewport: (u32, u32)) -> (u32, u32) {
    match plane.mode {
        ConvergenceMode::ThreeD => {
            let (vp_w, vp_h) = (viewport.0 as f32, viewport.1 as f32);
            let scale = (vp_w / plane.width_world.max(f32::EPSILON)).min(vp_h / plane.height_world.max(f32::EPSILON));
            (
                (plane.width_world * scale).round().max(1.0) as u32,
                (plane.height_world * scale).round().max(1.0) as u32,
            )
        }
        ConvergenceMode::Vr => {
            let aspect = view_w as f32 / view_h.max(1) as f32;
            if aspect >= 1.0 {
                (MAX_TEX, (MAX_TEX as f32 / aspect).round().max(1.0) as u32)
            } else {
                ((MAX_TEX as f32 * aspect).round().max(1.0) as u32, MAX_TEX)
            }
        }
    }
}

/// Rebuilds the bare `width_px`/`height_px`/`focal_px` a plane recompute
/// needs from the session's cached scalars, rather than borrowing the
/// original capture's `View` for the session's whole lifetime.
fn view_from_session(session: &XrSession) -> View {
    View {
        width_px: session.view_width_px,
        height_px: session.view_height_px,
        focal_px: session.view_focal_px,
        position: crate::capture::Vec3::default(),
        frustum_skew: crate::capture::Vec2::default(),
        rotation: crate::capture::Rotation {
            slant: crate::capture::Vec2::default(),
            roll_degrees: 0.0,
        },
        layers: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proj(m00: f32, m05: f32, m08: f32, m09: f32) -> [f32; 16] {
        let mut p = [0.0f32; 16];
        p[0] = m00;
        p[5] = m05;
        p[8] = m08;
        p[9] = m09;
        p
    }

    /// Builds a camera whose `tan_left()`/`tan_right()` round-trip to the
    /// requested values: solving `tan_left = -(1-m08)/m00` for `m08`
    /// given an arbitrary `m00` pins down both projection terms.
    fn symmetric_camera(x: f32, tan_left: f32, tan_right: f32) -> XrCamera {
        let m00 = 2.0 / (tan_left + tan_right);
        let m08 = 1.0 + tan_left * m00;
        XrCamera {
            position: Vec3::new(x, 0.0, 0.0),
            orientation: Quat::IDENTITY,
            proj: proj(m00, 1.0, m08, 0.0),
        }
    }

    #[test]
    fn mirrored_fov_falls_back_to_vr_mode() {
        let l = symmetric_camera(-0.032, 0.9, 1.1);
        let r = symmetric_camera(0.032, 1.1, 0.9);
        let view = View {
            width_px: 1000,
            height_px: 1000,
            focal_px: 500.0,
            position: crate::capture::Vec3::default(),
            frustum_skew: crate::capture::Vec2::default(),
            rotation: crate::capture::Rotation {
                slant: crate::capture::Vec2::default(),
                roll_degrees: 0.0,
            },
            layers: Vec::new(),
        };
        let plane = derive_convergence_plane(&l, &r, 0.1, 1.0, &view);
        assert_eq!(plane.mode, ConvergenceMode::Vr);
        let expected_d = VR_FALLBACK_CONSTANT / (0.1 * 1.0);
        assert!((plane.center - Vec3::NEG_Z * expected_d).length() < 1e-3);
    }

    #[test]
    fn asymmetric_canted_cameras_yield_finite_plane() {
        let l = symmetric_camera(-0.032, 0.9, 1.1);
        let r = symmetric_camera(0.032, 1.0, 1.0);
        let view = View {
            width_px: 1000,
            height_px: 1000,
            focal_px: 500.0,
            position: crate::capture::Vec3::default(),
            frustum_skew: crate::capture::Vec2::default(),
            rotation: crate::capture::Rotation {
                slant: crate::capture::Vec2::default(),
                roll_degrees: 0.0,
            },
            layers: Vec::new(),
        };
        let plane = derive_convergence_plane(&l, &r, 0.1, 1.0, &view);
        assert_eq!(plane.mode, ConvergenceMode::ThreeD);
        assert!(plane.width_world.is_finite());
        assert!(plane.height_world.is_finite());
    }

    #[test]
    fn reset_recenters_render_camera_to_origin() {
        let capture = Capture {
            views: vec![View {
                width_px: 1000,
                height_px: 1000,
                focal_px: 500.0,
                position: crate::capture::Vec3::default(),
                frustum_skew: crate::capture::Vec2::default(),
                rotation: crate::capture::Rotation {
                    slant: crate::capture::Vec2::default(),
                    roll_degrees: 0.0,
                },
                layers: vec![],
            }],
            stereo_render_data: None,
        };
        let mut session = XrSession::request(&capture).expect("session");
        // Same pose for both eyes: isolates the recentering behavior from
        // the inherent per-eye half-IPD x offset stereo cameras carry.
        let l = symmetric_camera(0.0, 1.0, 1.0);
        let r = symmetric_camera(0.0, 1.0, 1.0);
        session.reset(l, r);
        // First frame after a request only initializes; the second is
        // the first to actually carry render cameras.
        assert!(matches!(session.on_frame(l, r, GamepadState::default()).expect("frame"), XrFrame::Initializing));
        let frame = session.on_frame(l, r, GamepadState::default()).expect("frame");
        let XrFrame::Running(cam_l, cam_r) = frame else { panic!("expected Running") };
        assert!(cam_l.position.length() < 1e-3);
        assert!(cam_r.position.length() < 1e-3);
    }

    #[test]
    fn reset_button_edge_triggers_only_once() {
        let mut gamepad = GamepadState::default();
        gamepad.buttons_pressed[4] = true;
        let prev = false;
        let edge = gamepad.buttons_pressed[4] && !prev;
        assert!(edge);
        let prev2 = true;
        let edge2 = gamepad.buttons_pressed[4] && !prev2;
        assert!(!edge2);
    }
}
