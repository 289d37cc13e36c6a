use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: body length (4) + channel (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Number of addressable channels (one byte of channel id).
pub const MAX_CHANNELS: usize = 256;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest payload the length field can describe.
const WIRE_MAX_PAYLOAD: usize = u32::MAX as usize - 1;

/// A framed message addressed to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: u8,
    pub payload_len: usize,
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌─────────────────────┬────────────┬────────────────────┐
/// │ Length (4B BE)      │ Channel    │ Payload            │
/// │ = payload len + 1   │ (1B)       │ (payload len bytes)│
/// └─────────────────────┴────────────┴────────────────────┘
/// ```
pub fn encode_frame(channel: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > WIRE_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: WIRE_MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32 + 1);
    dst.put_u8(channel);
    dst.put_slice(payload);
    Ok(())
}

/// Parse a header from the front of `src` without consuming it.
///
/// Returns `Ok(None)` if fewer than [`HEADER_SIZE`] bytes are available.
/// The length bound is checked here so an oversized frame is rejected before
/// any payload is buffered.
pub fn decode_header(src: &[u8], max_payload: usize) -> Result<Option<FrameHeader>> {
    let Some(header) = src.get(..HEADER_SIZE) else {
        return Ok(None);
    };

    let body_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if body_len == 0 {
        return Err(FrameError::InvalidLength(body_len));
    }

    let payload_len = (body_len - 1) as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    Ok(Some(FrameHeader {
        channel: header[4],
        payload_len,
    }))
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = decode_header(src, max_payload)? else {
        return Ok(None);
    };

    let total = HEADER_SIZE + header.payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len).freeze();

    Ok(Some(Frame {
        channel: header.channel,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, enforced on both encode and decode.
    /// Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
