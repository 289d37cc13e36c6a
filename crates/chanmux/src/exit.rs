use std::fmt;
use std::io;

use chanmux_frame::FrameError;
use chanmux_mux::MuxError;
use chanmux_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidLength(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Timeout => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Frame(err) => frame_error(context, err),
        MuxError::Io(err) => io_error(context, err),
        MuxError::Timeout => CliError::new(TIMEOUT, format!("{context}: {err}")),
        MuxError::Disabled(_) => CliError::new(USAGE, format!("{context}: {err}")),
        MuxError::Closed | MuxError::Ignored { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        MuxError::ResourceExhausted { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_errors_map_to_exit_codes() {
        assert_eq!(mux_error("x", MuxError::Timeout).code, TIMEOUT);
        assert_eq!(mux_error("x", MuxError::Closed).code, FAILURE);
        assert_eq!(mux_error("x", MuxError::Disabled(3)).code, USAGE);
        assert_eq!(
            mux_error("x", MuxError::Frame(FrameError::InvalidLength(0))).code,
            DATA_INVALID
        );
        assert_eq!(
            mux_error(
                "x",
                MuxError::ResourceExhausted {
                    channel: 1,
                    requested: 9
                }
            )
            .code,
            INTERNAL
        );
    }

    #[test]
    fn message_carries_context() {
        let err = mux_error("select failed", MuxError::Closed);
        assert_eq!(err.to_string(), "select failed: stream closed");
    }

    #[test]
    fn path_too_long_is_transport_error() {
        let err = transport_error(
            "bind failed",
            TransportError::PathTooLong {
                path: "/tmp/x".into(),
                len: 200,
                max: 108,
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
