//! Channel multiplexer over a single framed byte stream.
//!
//! A [`Multiplex`] owns one bidirectional stream and up to 256 per-channel
//! receive buffers. `select` reports which channel has new data (reading at
//! most one frame from the stream to find out), and `receive`/`read`/`copy`
//! drain or inspect the buffered bytes. Every operation runs under one
//! instance-wide lock, so an instance can be shared between threads.

pub mod buffer;
pub mod config;
pub mod error;
pub mod multiplex;

pub use buffer::ChannelBuffer;
pub use config::{MuxConfig, DEFAULT_CHANNEL_CAPACITY};
pub use error::{MuxError, Result};
pub use multiplex::{ChannelView, Multiplex};
