/// Error type shared by every component of the rendering core.
///
/// Variants map directly onto the taxonomy the container parser, resource
/// manager, renderer and XR session manager are specified to raise: input
/// errors are fatal only for the capture being loaded, resource errors are
/// fatal for the whole core, and session/transport errors never tear down
/// the renderer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // --- input errors (§7): fatal for the current capture only ---
    #[error("not a capture: missing or malformed trailing magic")]
    NotACapture,
    #[error("truncated container: {0}")]
    TruncatedContainer(String),
    #[error("missing metadata field (expected JSON_META or JSON_META_NEW)")]
    MissingMetadata,
    #[error("unsupported container version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid blob reference: {0}")]
    InvalidBlobReference(i64),
    #[error("image decode failed: {0}")]
    ImageDecodeFailed(#[from] image::ImageError),
    #[error("unsupported layer count: {0} (expected 1..=4)")]
    UnsupportedLayerCount(usize),
    #[error("unsupported view count: {0} (expected 1 or 2)")]
    UnsupportedViewCount(usize),
    #[error("invalid capture json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    // --- resource errors (§7): fatal for the core ---
    #[error("gpu texture allocation failed: {0}")]
    TextureAllocationFailed(String),
    #[error("shader link failed: {0}")]
    ShaderLinkFailed(String),
    #[error("shader compile failed: {0}")]
    ShaderCompileFailed(String),
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] ldi_gpu::Error),

    // --- session errors (§7): renderer keeps running, reverts to a
    // non-XR test scene ---
    #[error("xr not supported on this platform")]
    XrNotSupported,
    #[error("xr session request failed: {0}")]
    XrSessionRequestFailed(String),

    // --- transport errors (§4.7 / §7): session evicted, no teardown ---
    #[error("unknown chunk session: {0}")]
    UnknownSession(String),
    #[error("chunk session {0} timed out")]
    SessionTimedOut(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;
