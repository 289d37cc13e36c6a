//! Byte-stream handles for the channel multiplexer.
//!
//! The multiplexer needs exactly two things from its stream: blocking
//! reads/writes and a way to wait, for a bounded time, until a read would not
//! block. This crate provides:
//! - [`PollRead`], the readiness trait consumed by the multiplexer
//! - [`IpcStream`], a handle over a Unix stream socket or a pipe descriptor
//! - [`UnixDomainSocket`], bind/accept/connect for filesystem sockets

pub mod error;
#[cfg(unix)]
pub mod poll;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{IpcStream, PollRead};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
