//! Websocket wire protocol between the demo client and [`crate::app::App`].
//!
//! Control messages (camera pose updates, chunk acks) are plain JSON text
//! frames; rendered output travels as base64 chunks per spec.md §4.7,
//! split with [`ldi_core::transport::split_into_chunks`] so a single eye's
//! frame never exceeds the 800 KiB chunk ceiling.

use glam::{Quat, Vec3};
use ldi_core::{GamepadState, XrCamera};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One frame's worth of head-tracked stereo camera poses, sent by the
    /// client every time its local XR frame loop ticks.
    Pose {
        left: CameraWire,
        right: CameraWire,
        #[serde(default)]
        buttons_pressed: [bool; 8],
    },
    /// A mono (non-XR) camera pose, used by the fallback test-scene loop.
    MonoPose { camera: CameraWire },
    /// Explicit request to recompute the convergence plane, mirroring the
    /// gamepad reset-button edge the browser extension exposes as a UI
    /// button.
    ResetXr,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CameraWire {
    pub position: [f32; 3],
    /// `[x, y, z, w]`.
    pub orientation: [f32; 4],
    /// Flattened column-major 4x4 projection matrix.
    pub proj: [f32; 16],
}

impl CameraWire {
    pub fn into_xr_camera(self) -> XrCamera {
        XrCamera {
            position: Vec3::from_array(self.position),
            orientation: Quat::from_xyzw(
                self.orientation[0],
                self.orientation[1],
                self.orientation[2],
                self.orientation[3],
            ),
            proj: self.proj,
        }
    }
}

pub fn gamepad_from_wire(buttons_pressed: [bool; 8]) -> GamepadState {
    GamepadState { buttons_pressed }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One chunk of a base64-encoded rendered eye frame (§4.7).
    Chunk { session_id: String, index: u32, total: u32, eye: Eye, bytes_b64: String },
    /// The capture's shape, sent once after connect.
    CaptureSummary(ldi_core::CaptureSummary),
    /// A fatal per-connection error; the socket is closed after sending it.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    Mono,
    Left,
    Right,
}

/// Encodes one eye's rendered PNG bytes as a sequence of [`ServerMessage::Chunk`]
/// frames ready to send in order.
pub fn chunk_frame(session_id: &str, eye: Eye, png_bytes: &[u8]) -> Vec<ServerMessage> {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes);
    ldi_core::transport::split_into_chunks(session_id, b64.as_bytes())
        .into_iter()
        .map(|frame| ServerMessage::Chunk {
            session_id: frame.session_id,
            index: frame.index,
            total: frame.total,
            eye,
            bytes_b64: String::from_utf8(frame.bytes).expect("base64 alphabet is valid utf8"),
        })
        .collect()
}
