//! Async ticket-based decode dispatch.
//!
//! Hands layer decode/downscale/compose work (§4.2) to a dedicated
//! blocking worker and returns a [`Ticket`] the caller awaits for the
//! result, the same give/ticket shape `stitch::loader` uses for camera
//! frame buffers. A generation counter implements the cancellation rule
//! from §5: loading a new capture bumps the generation, and decode jobs
//! queued under a stale generation are dropped by the worker instead of
//! racing textures from the old capture into the new one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::capture::Layer;
use crate::resource::{self, LayerPixels};
use crate::{Error, Result};

struct DecodeJob {
    generation: u64,
    layer: Layer,
    max_side: Option<u32>,
    resp: kanal::OneshotSender<Result<LayerPixels>>,
}

/// Dispatches layer decode jobs onto one blocking worker thread, FIFO.
pub struct DecodeLoader {
    req_send: kanal::Sender<DecodeJob>,
    generation: Arc<AtomicU64>,
}

impl DecodeLoader {
    pub fn new() -> Self {
        let (req_send, req_recv) = kanal::bounded::<DecodeJob>(8);
        let generation = Arc::new(AtomicU64::new(0));
        let worker_generation = Arc::clone(&generation);

        tokio::task::spawn_blocking(move || loop {
            match req_recv.recv() {
                Ok(job) => {
                    if job.generation != worker_generation.load(Ordering::Acquire) {
                        tracing::debug!(generation = job.generation, "dropping decode job from a superseded capture");
                        continue;
                    }
                    let result = resource::prepare_layer_pixels(&job.layer, job.max_side);
                    // The caller may have dropped its ticket already; that's fine.
                    let _ = job.resp.send(result);
                }
                Err(kanal::ReceiveError::SendClosed | kanal::ReceiveError::Closed) => {
                    tracing::debug!("decode loader exiting, no senders remain");
                    break;
                }
            }
        });

        Self { req_send, generation }
    }

    /// Bumps the generation counter. Jobs already queued from the
    /// previous capture are discarded by the worker rather than
    /// producing textures for a capture that's no longer current.
    pub fn begin_new_capture(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Queues `layer` for decode and returns a ticket for its pixels.
    pub fn dispatch(&self, layer: Layer, max_side: Option<u32>) -> Result<Ticket> {
        let (resp, recv) = kanal::oneshot();
        let job = DecodeJob {
            generation: self.generation.load(Ordering::Acquire),
            layer,
            max_side,
            resp,
        };
        self.req_send
            .send(job)
            .map_err(|_| Error::TextureAllocationFailed("decode loader has shut down".into()))?;
        Ok(Ticket(recv))
    }
}

impl Default for DecodeLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending decode result. Dropping the ticket without taking it simply
/// discards the eventual result.
pub struct Ticket(kanal::OneshotReceiver<Result<LayerPixels>>);

impl Ticket {
    pub async fn take(self) -> Result<LayerPixels> {
        self.0
            .to_async()
            .recv()
            .await
            .map_err(|_| Error::TextureAllocationFailed("decode worker dropped the ticket".into()))?
    }

    pub fn block_take(self) -> Result<LayerPixels> {
        self.0
            .recv()
            .map_err(|_| Error::TextureAllocationFailed("decode worker dropped the ticket".into()))?
    }
}

/// Awaits every ticket, discarding results: used when a capture load is
/// abandoned mid-flight (§5 "Cancellation").
pub async fn discard_tickets(tickets: Vec<Ticket>) {
    for ticket in tickets {
        let _ = ticket.take().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::InvZMap;

    fn tiny_png() -> Vec<u8> {
        // 1x1 white PNG.
        const BYTES: &[u8] = &[
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00,
            0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00,
            0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xFC, 0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05,
            0x05, 0x02, 0x80, 0x8A, 0xCC, 0xD0, 0x87, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42,
            0x60, 0x82,
        ];
        BYTES.to_vec()
    }

    fn layer() -> Layer {
        Layer {
            width_px: 1,
            height_px: 1,
            focal_px: 500.0,
            image: tiny_png(),
            inv_z_map: InvZMap { bytes: tiny_png(), min: 1.0, max: 0.0 },
            mask: None,
        }
    }

    #[tokio::test]
    async fn dispatched_job_decodes_and_completes() {
        let loader = DecodeLoader::new();
        let ticket = loader.dispatch(layer(), None).expect("dispatch");
        let pixels = ticket.take().await.expect("decode");
        assert_eq!(pixels.color.dimensions(), (1, 1));
    }

    #[tokio::test]
    async fn stale_generation_jobs_never_resolve_their_ticket() {
        let loader = DecodeLoader::new();
        loader.begin_new_capture();
        // Force the job's captured generation to lag behind by
        // dispatching, then bumping again before the worker drains it.
        let ticket = loader.dispatch(layer(), None).expect("dispatch");
        loader.begin_new_capture();
        // Either outcome (dropped before running, or already completed
        // under the prior generation) is acceptable; the point is the
        // caller never blocks forever on a guaranteed-stale ticket.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), ticket.take()).await;
    }
}
