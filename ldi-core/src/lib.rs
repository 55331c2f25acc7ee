//! LDI Rendering Core.
//!
//! Parses a layered-depth-image capture container ([`capture`]), uploads
//! its layers as GPU resources ([`resource`], gated behind the `gpu`
//! feature), and raycasts novel views from it ([`renderer`]) under either
//! a fixed camera sweep or a head-tracked XR session ([`xr`]), presenting
//! the result through a textured-quad scene host ([`scene`]). [`container`]
//! and [`camera_math`] are the low-level building blocks the above are
//! built from; [`transport`] models the external chunked request/response
//! channel (C9) and [`loader`] dispatches layer decode work off the async
//! runtime thread.

mod error;

pub mod camera_math;
pub mod capture;
pub mod container;
pub mod loader;
pub mod resource;
pub mod transport;

#[cfg(feature = "gpu")]
pub mod renderer;
#[cfg(feature = "gpu")]
pub mod scene;
#[cfg(feature = "gpu")]
pub mod shader_lib;
#[cfg(feature = "gpu")]
pub mod xr;

pub use error::{Error, Result};

pub use capture::{Capture, CaptureSummary};
#[cfg(feature = "gpu")]
pub use renderer::{DrawPolicy, RenderCamera, Renderer};
#[cfg(feature = "gpu")]
pub use scene::SceneHost;
#[cfg(feature = "gpu")]
pub use xr::{ConvergencePlane, GamepadState, XrCamera, XrFrame, XrSession};
