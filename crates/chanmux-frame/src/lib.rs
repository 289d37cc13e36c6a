//! Length-prefixed, channel-tagged framing.
//!
//! Every frame on the wire is:
//! - a 4-byte big-endian body length (payload length + 1)
//! - a 1-byte channel id
//! - the payload
//!
//! There is no magic, checksum or acknowledgement; the stream is assumed to
//! be reliable and ordered.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_CHANNELS,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::{write_frame_once, FrameWriter};
