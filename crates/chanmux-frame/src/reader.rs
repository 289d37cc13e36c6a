use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chanmux_transport::PollRead;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from a [`PollRead`] stream under a wait budget.
///
/// Bytes of a partially received frame stay buffered across a
/// [`FrameError::Timeout`], so a timed-out read never desynchronizes the
/// stream: the next call picks up where this one stopped. Bytes read past
/// the end of a frame are kept for the next call as well.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: PollRead> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame, waiting at most `timeout` overall.
    ///
    /// A frame already sitting in the read buffer is returned without
    /// touching the stream. Returns `Err(FrameError::ConnectionClosed)` at
    /// EOF and `Err(FrameError::Timeout)` when the budget runs out first.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(
                    channel = frame.channel,
                    size = frame.payload.len(),
                    "decoded frame"
                );
                return Ok(frame);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if !self.inner.poll_read(remaining)? {
                return Err(FrameError::Timeout);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // Spurious readiness; poll again with what is left of the budget.
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of received bytes not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Any buffered partial frame is lost.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
