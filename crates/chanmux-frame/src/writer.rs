use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::warn;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Encode one frame into `scratch` and hand it to `dst` in a single `write`.
///
/// Returns what that write reported: the number of bytes accepted, which
/// may be less than the frame size. No partial-write retry happens here;
/// only `EINTR` is retried since nothing was written. A write of zero bytes
/// is reported as [`FrameError::ConnectionClosed`].
///
/// A failed flush after an accepted write is logged, not returned: the
/// bytes are already on the stream and the count is still what the caller
/// needs to tell whether the frame went out whole.
pub fn write_frame_once<W: Write>(
    dst: &mut W,
    scratch: &mut BytesMut,
    channel: u8,
    payload: &[u8],
    max_payload_size: usize,
) -> Result<usize> {
    if payload.len() > max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload_size,
        });
    }

    scratch.clear();
    encode_frame(channel, payload, scratch)?;

    let written = loop {
        match dst.write(&scratch[..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => break n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    };

    if let Err(err) = dst.flush() {
        warn!(error = %err, channel, written, "flush failed after frame write");
    }
    Ok(written)
}

/// Writes frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a frame with one `write` call; see [`write_frame_once`].
    pub fn send(&mut self, channel: u8, payload: &[u8]) -> Result<usize> {
        write_frame_once(
            &mut self.inner,
            &mut self.buf,
            channel,
            payload,
            self.config.max_payload_size,
        )
    }

    /// Encode and write a frame, retrying until every byte is written.
    pub fn send_all(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let mut offset = self.send(channel, payload)?;

        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send_all(frame.channel, frame.payload.as_ref())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
