use std::sync::Arc;

use crate::{Error, Result};

/// Owns the wgpu device and queue. Every builder in this crate takes a
/// `&Context` (or the global singleton in [`crate::global`]) to realize
/// itself on the device.
pub struct Context {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl Context {
    /// Starts building a context against the default backend.
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder {
            instance: wgpu::Instance::default(),
            power_preference: wgpu::PowerPreference::default(),
        }
    }

    #[inline]
    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Submits a batch of encoded command buffers to the queue.
    #[inline]
    pub fn submit(&self, buffers: impl IntoIterator<Item = wgpu::CommandBuffer>) {
        self.queue.submit(buffers);
    }

    /// Creates a fresh command encoder for a single frame.
    #[inline]
    pub fn encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None })
    }

    /// Polls the device until all submitted work completes. Used after
    /// submitting readback copies so `MemMapper` callbacks fire.
    #[inline]
    pub fn block_poll(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

impl AsRef<wgpu::Device> for Context {
    #[inline]
    fn as_ref(&self) -> &wgpu::Device {
        &self.device
    }
}

/// Builds a [`Context`] by requesting an adapter and device from a wgpu
/// instance. Async because adapter/device negotiation is async in wgpu.
pub struct ContextBuilder {
    instance: wgpu::Instance,
    power_preference: wgpu::PowerPreference,
}

impl ContextBuilder {
    /// Prefers a high-performance (typically discrete) adapter.
    #[must_use]
    pub const fn high_performance(mut self) -> Self {
        self.power_preference = wgpu::PowerPreference::HighPerformance;
        self
    }

    /// Requests an adapter and device and builds the [`Context`].
    pub async fn build(self) -> Result<Arc<Context>> {
        let adapter = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(Error::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Arc::new(Context { device, queue }))
    }
}
