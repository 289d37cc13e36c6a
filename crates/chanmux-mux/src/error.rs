use chanmux_frame::FrameError;

/// Status code for [`MuxError::Closed`] (and other terminal failures).
pub const STATUS_CLOSED: i32 = -1;
/// Status code for [`MuxError::Timeout`].
pub const STATUS_TIMEOUT: i32 = -77;
/// Status code for [`MuxError::Ignored`].
pub const STATUS_IGNORED: i32 = -255;
/// Status code for [`MuxError::ResourceExhausted`] (`-ENOMEM`).
pub const STATUS_RESOURCE_EXHAUSTED: i32 = -12;

/// Outcomes of multiplexer operations other than success.
///
/// `Timeout` and `Ignored` are routine: callers are expected to loop on
/// `select`/`receive` and simply try again.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The stream reached end-of-data or failed; no further frames can be read.
    #[error("stream closed")]
    Closed,

    /// The wait budget expired before a complete frame arrived.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// A frame arrived for a disabled channel, or for a channel other than
    /// the one passed to `receive`.
    #[error("data for channel {channel} was not delivered to this call")]
    Ignored { channel: u8 },

    /// Growing a channel buffer failed; the triggering data was dropped.
    #[error("channel {channel}: cannot allocate {requested} bytes")]
    ResourceExhausted { channel: u8, requested: usize },

    /// The channel is not enabled.
    #[error("channel {0} is not enabled")]
    Disabled(u8),

    /// The peer sent a malformed frame, or a payload exceeds the limit.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// A stream write failed for a reason other than a closed peer.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MuxError {
    /// Integer status code in the classic multiplex convention: negative
    /// values, with `Closed` = -1, `Timeout` = -77 and `Ignored` = -255.
    pub fn status_code(&self) -> i32 {
        match self {
            MuxError::Timeout => STATUS_TIMEOUT,
            MuxError::Ignored { .. } => STATUS_IGNORED,
            MuxError::ResourceExhausted { .. } => STATUS_RESOURCE_EXHAUSTED,
            MuxError::Closed | MuxError::Disabled(_) | MuxError::Frame(_) | MuxError::Io(_) => {
                STATUS_CLOSED
            }
        }
    }

    /// True for outcomes where calling again is the expected reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MuxError::Timeout | MuxError::Ignored { .. })
    }

    /// True once the stream can no longer deliver frames.
    pub fn is_closed(&self) -> bool {
        matches!(self, MuxError::Closed)
    }
}

impl From<FrameError> for MuxError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Timeout => MuxError::Timeout,
            FrameError::ConnectionClosed => MuxError::Closed,
            FrameError::Io(io) => MuxError::Io(io),
            other => MuxError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
