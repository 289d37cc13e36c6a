//! Many logical channels over one pipe or socket.
//!
//! chanmux tags every message with a one-byte channel id and buffers what
//! arrives per channel, so up to 256 independent conversations can share a
//! single bidirectional byte stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: stream handles (`IpcStream`, Unix domain sockets) and the
//!   `PollRead` readiness trait
//! - [`frame`]: the `[len+1][channel][payload]` wire codec with timed reads
//! - [`mux`]: the multiplexer itself, with per-channel growable buffers

/// Re-export transport types.
pub mod transport {
    pub use chanmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chanmux_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use chanmux_mux::*;
}

pub use chanmux_mux::{Multiplex, MuxConfig, MuxError};
