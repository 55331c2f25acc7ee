use crate::{Buffer, Context};

/// Reads a [`Buffer`] back to the host. Wraps wgpu's async `map_async`
/// callback in a blocking `kanal` rendezvous so callers don't need to be
/// async themselves — the renderer's readback path runs on a plain
/// worker thread, not inside a tokio task.
pub struct MemMapper<'a> {
    ctx: &'a Context,
}

impl<'a> MemMapper<'a> {
    #[must_use]
    pub const fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Maps the whole buffer for reading, blocks until the map completes,
    /// copies the bytes out, then unmaps. `buf` must have been created
    /// with `COPY_SRC` usage omitted and instead be the destination of a
    /// prior `copy_buffer_to_buffer`/`copy_texture_to_buffer` — i.e. it
    /// should be a plain staging buffer, not the live storage buffer the
    /// shader wrote into.
    pub fn read(&self, buf: &Buffer) -> Vec<u8> {
        let slice = buf.raw().slice(..);
        let (tx, rx) = kanal::oneshot();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.ctx.block_poll();

        rx.recv()
            .expect("map_async callback dropped without sending")
            .expect("buffer map failed");

        let data = slice.get_mapped_range().to_vec();
        buf.raw().unmap();
        data
    }
}
