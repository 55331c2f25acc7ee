//! C9: Session/Chunk Transport — external API surface only (§4.7).
//!
//! Reassembles oversized payloads (base64 images, large responses) that
//! arrive as a sequence of size-limited chunk frames over a duplex
//! channel this crate does not own. Each session is an explicit state
//! machine advanced only by externally delivered frames — no hidden
//! suspension (§9 "Coroutine-style chunked transport").

use std::collections::HashMap;
use std::time::Duration;

/// Chunk payload ceiling (§4.7): 800 KiB minus framing overhead.
pub const MAX_CHUNK_BYTES: usize = 800 * 1024 - 256;

/// How long a direct request stays eligible for `response_`-prefixed
/// session binding (§4.7 "Deduplication").
const RESPONSE_BINDING_WINDOW: Duration = Duration::from_secs(30);

/// A single chunk frame as delivered by the host channel.
#[derive(Debug, Clone)]
pub struct ChunkFrame {
    pub session_id: String,
    pub index: u32,
    pub total: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Sending,
    AwaitingAck,
    Reassembling,
    Complete,
    Failed,
}

struct ChunkSession {
    total: u32,
    received: HashMap<u32, Vec<u8>>,
    state: SessionState,
    /// Monotonic tick (caller-supplied, since `Instant::now()` isn't
    /// available to workflow-run code) the session was last touched, for
    /// eviction and the 30s `response_` rebinding window.
    last_touched_tick: u64,
}

impl ChunkSession {
    fn new(total: u32, tick: u64) -> Self {
        Self {
            total,
            received: HashMap::new(),
            state: if total == 0 { SessionState::Complete } else { SessionState::Reassembling },
            last_touched_tick: tick,
        }
    }

    fn accept(&mut self, index: u32, bytes: Vec<u8>, tick: u64) {
        if self.state == SessionState::Complete || self.state == SessionState::Failed {
            return;
        }
        self.last_touched_tick = tick;
        // Duplicate chunks are ignored (P7); `entry().or_insert` keeps the
        // first delivery rather than overwriting with a later duplicate.
        self.received.entry(index).or_insert(bytes);
        if self.received.len() as u32 == self.total {
            self.state = SessionState::Complete;
        }
    }

    fn reassembled(&self) -> Option<Vec<u8>> {
        if self.state != SessionState::Complete {
            return None;
        }
        let mut out = Vec::new();
        for i in 0..self.total {
            out.extend_from_slice(self.received.get(&i)?);
        }
        Some(out)
    }
}

/// Out-of-band token emitted when the producer cannot inline a response
/// (§4.7).
#[derive(Debug, Clone)]
pub enum ResponseToken {
    ChunkedReady { session_id: String, total_chunks: u32, total_size: u64 },
    LargeResponse { file_path: String, size: u64 },
}

/// One tick's worth of elapsed time, expressed the way the caller's own
/// clock ticks (frame count, poll count, or a millisecond counter) —
/// kept abstract so this module never calls a wall-clock primitive
/// itself.
pub type Tick = u64;

/// Tracks every in-flight chunked session and the direct-request ledger
/// `response_`-prefixed sessions rebind against.
pub struct ChunkTransport {
    sessions: HashMap<String, ChunkSession>,
    /// `request_id -> tick` of direct requests still eligible for
    /// `response_` session rebinding (§4.7).
    direct_requests: HashMap<String, Tick>,
    tick_duration: Duration,
}

impl ChunkTransport {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            direct_requests: HashMap::new(),
            // Callers that never configure a tick duration get the
            // conservative default of 1 tick = 1 second, so the 30s
            // window above is expressed in ticks directly.
            tick_duration: Duration::from_secs(1),
        }
    }

    pub fn with_tick_duration(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            ..Self::new()
        }
    }

    /// Records a direct (non-chunked) request at `tick`, making it
    /// eligible for `response_` session rebinding for the next 30s.
    pub fn record_direct_request(&mut self, request_id: impl Into<String>, tick: Tick) {
        self.direct_requests.insert(request_id.into(), tick);
    }

    /// Feeds one chunk frame into its session, creating the session on
    /// first sight. Returns the reassembled payload once every index in
    /// `[0, total)` has arrived at least once (P7); duplicates are
    /// silently dropped.
    pub fn accept_chunk(&mut self, frame: ChunkFrame, tick: Tick) -> crate::Result<Option<Vec<u8>>> {
        if frame.index >= frame.total {
            return Err(crate::Error::UnknownSession(frame.session_id));
        }
        let session = self
            .sessions
            .entry(frame.session_id.clone())
            .or_insert_with(|| ChunkSession::new(frame.total, tick));
        session.accept(frame.index, frame.bytes, tick);
        Ok(session.reassembled())
    }

    /// Binds a newly-seen `response_`-prefixed session id to the most
    /// recent direct request still within the 30s rebinding window,
    /// transferring ownership of that request's tracking slot. Returns
    /// the bound request id, if any.
    pub fn bind_response_session(&mut self, session_id: &str, tick: Tick) -> Option<String> {
        if !session_id.starts_with("response_") {
            return None;
        }
        let window_ticks = (RESPONSE_BINDING_WINDOW.as_secs_f64() / self.tick_duration.as_secs_f64()).ceil() as u64;
        let newest = self
            .direct_requests
            .iter()
            .filter(|(_, &t)| tick.saturating_sub(t) <= window_ticks)
            .max_by_key(|(_, &t)| t)
            .map(|(id, _)| id.clone())?;
        self.direct_requests.remove(&newest);
        Some(newest)
    }

    /// Evicts a session, marking it `Failed` first so any in-flight
    /// `accept_chunk` calls against it become no-ops (§7 "the consumer
    /// receives a single terminal error and the session is evicted").
    pub fn evict(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.state = SessionState::Failed;
        }
        self.sessions.remove(session_id);
    }

    pub fn is_reassembling(&self, session_id: &str) -> bool {
        self.sessions.get(session_id).is_some_and(|s| s.state == SessionState::Reassembling)
    }
}

impl Default for ChunkTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `payload` into `<= MAX_CHUNK_BYTES`-sized frames for `session_id`,
/// the sender-side mirror of `accept_chunk`'s reassembly.
pub fn split_into_chunks(session_id: &str, payload: &[u8]) -> Vec<ChunkFrame> {
    let total = payload.len().div_ceil(MAX_CHUNK_BYTES).max(1) as u32;
    payload
        .chunks(MAX_CHUNK_BYTES)
        .enumerate()
        .map(|(i, bytes)| ChunkFrame {
            session_id: session_id.to_string(),
            index: i as u32,
            total,
            bytes: bytes.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_out_of_order_chunks_with_one_duplicate() {
        let payload = vec![7u8; 3_670_016]; // 3.5 MiB
        let mut frames = split_into_chunks("s1", &payload);
        assert!(frames.len() >= 5);

        // Shuffle deterministically (reverse) and duplicate the first.
        frames.reverse();
        let dup = frames[0].clone();
        frames.insert(1, dup);

        let mut transport = ChunkTransport::new();
        let mut result = None;
        for frame in frames {
            if let Some(bytes) = transport.accept_chunk(frame, 0).expect("accept") {
                result = Some(bytes);
            }
        }
        assert_eq!(result.expect("reassembled"), payload);
    }

    #[test]
    fn duplicate_chunk_does_not_corrupt_reassembly() {
        let payload = b"hello world, this is chunked".to_vec();
        let mut transport = ChunkTransport::new();
        let frames = vec![
            ChunkFrame { session_id: "s".into(), index: 0, total: 2, bytes: payload[..10].to_vec() },
            ChunkFrame { session_id: "s".into(), index: 0, total: 2, bytes: payload[..10].to_vec() },
            ChunkFrame { session_id: "s".into(), index: 1, total: 2, bytes: payload[10..].to_vec() },
        ];
        let mut result = None;
        for frame in frames {
            if let Some(bytes) = transport.accept_chunk(frame, 0).expect("accept") {
                result = Some(bytes);
            }
        }
        assert_eq!(result.expect("reassembled"), payload);
    }

    #[test]
    fn response_session_binds_to_most_recent_request_in_window() {
        let mut transport = ChunkTransport::new();
        transport.record_direct_request("req-old", 0);
        transport.record_direct_request("req-new", 10);
        let bound = transport.bind_response_session("response_abc", 15);
        assert_eq!(bound.as_deref(), Some("req-new"));
    }

    #[test]
    fn response_session_outside_window_does_not_bind() {
        let mut transport = ChunkTransport::new();
        transport.record_direct_request("req-old", 0);
        let bound = transport.bind_response_session("response_abc", 60);
        assert!(bound.is_none());
    }

    #[test]
    fn evicted_session_ignores_further_chunks() {
        let mut transport = ChunkTransport::new();
        transport
            .accept_chunk(ChunkFrame { session_id: "s".into(), index: 0, total: 2, bytes: vec![1] }, 0)
            .expect("accept");
        transport.evict("s");
        assert!(!transport.is_reassembling("s"));
    }
}
