/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field is zero, so there is no room for the channel byte.
    #[error("invalid frame length field ({0}, must be at least 1)")]
    InvalidLength(u32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached end-of-data (possibly mid-frame).
    #[error("connection closed")]
    ConnectionClosed,

    /// No complete frame arrived within the wait budget.
    #[error("timed out waiting for frame data")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, FrameError>;
