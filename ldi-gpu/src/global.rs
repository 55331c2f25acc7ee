//! A process-wide [`Context`], lazily initialized on first use.
//!
//! The renderer core is built once per process and there is rarely a
//! reason to juggle more than one `wgpu::Device` in the same program, so
//! most call sites just reach for [`context`] instead of threading a
//! `&Context` through every function signature.

use std::sync::{Arc, OnceLock};

use crate::Context;

static CONTEXT: OnceLock<Arc<Context>> = OnceLock::new();

/// Returns the global [`Context`], building it on first call with
/// [`Context::builder().high_performance()`]. Panics if adapter/device
/// negotiation fails — by the time anything calls this, the caller has
/// already decided a GPU is required.
pub fn context() -> Arc<Context> {
    CONTEXT
        .get_or_init(|| {
            pollster::block_on(async {
                Context::builder()
                    .high_performance()
                    .build()
                    .await
                    .expect("failed to initialize gpu context")
            })
        })
        .clone()
}

/// Installs an explicit context as the global one. Intended for tests or
/// hosts that already negotiated a device for other reasons (e.g. a
/// windowing surface). Returns `Err` with the argument back if the
/// global was already initialized.
pub fn set_context(ctx: Arc<Context>) -> Result<(), Arc<Context>> {
    CONTEXT.set(ctx)
}
