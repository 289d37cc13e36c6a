use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A readable stream that can wait, for a bounded time, until a read would
/// not block.
///
/// This is the only capability the multiplexer needs beyond `Read`/`Write`.
/// `poll_read` returning `Ok(true)` does not promise data: a hung-up peer is
/// also "ready" and the following read returns 0.
pub trait PollRead: Read {
    /// Wait up to `timeout` for the stream to become readable.
    ///
    /// Returns `Ok(false)` if the timeout elapsed first.
    fn poll_read(&self, timeout: Duration) -> std::io::Result<bool>;
}

/// A connected byte stream: a Unix stream socket or a pipe descriptor.
///
/// Implements `Read`, `Write` and [`PollRead`], so it can be handed directly
/// to a multiplexer.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    /// Pipe or other inherited descriptor (stdin/stdout, `pipe(2)` ends).
    #[cfg(unix)]
    Fd(std::fs::File),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(unix)]
            IpcStreamInner::Fd(file) => file.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(unix)]
            IpcStreamInner::Fd(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            #[cfg(unix)]
            IpcStreamInner::Fd(file) => file.flush(),
        }
    }
}

#[cfg(unix)]
impl PollRead for IpcStream {
    fn poll_read(&self, timeout: Duration) -> std::io::Result<bool> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
            IpcStreamInner::Fd(file) => file.as_raw_fd(),
        };
        crate::poll::wait_readable(fd, timeout)
    }
}

#[cfg(unix)]
impl PollRead for std::os::unix::net::UnixStream {
    fn poll_read(&self, timeout: Duration) -> std::io::Result<bool> {
        crate::poll::wait_readable(std::os::fd::AsRawFd::as_raw_fd(self), timeout)
    }
}

#[cfg(unix)]
impl PollRead for std::fs::File {
    fn poll_read(&self, timeout: Duration) -> std::io::Result<bool> {
        crate::poll::wait_readable(std::os::fd::AsRawFd::as_raw_fd(self), timeout)
    }
}

#[cfg(unix)]
impl PollRead for std::net::TcpStream {
    fn poll_read(&self, timeout: Duration) -> std::io::Result<bool> {
        crate::poll::wait_readable(std::os::fd::AsRawFd::as_raw_fd(self), timeout)
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Take ownership of a pipe (or any readable/writable) descriptor.
    #[cfg(unix)]
    pub fn from_fd(fd: std::os::fd::OwnedFd) -> Self {
        Self {
            inner: IpcStreamInner::Fd(std::fs::File::from(fd)),
        }
    }

    /// A stream over a duplicate of this process's stdin.
    #[cfg(unix)]
    pub fn stdin() -> Result<Self> {
        use std::os::fd::AsFd;

        let fd = std::io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self::from_fd(fd))
    }

    /// A stream over a duplicate of this process's stdout.
    ///
    /// Writes bypass Rust's stdout buffering, so one frame is one `write(2)`.
    #[cfg(unix)]
    pub fn stdout() -> Result<Self> {
        use std::os::fd::AsFd;

        let fd = std::io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self::from_fd(fd))
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            #[cfg(unix)]
            IpcStreamInner::Fd(file) => Ok(Self {
                inner: IpcStreamInner::Fd(file.try_clone()?),
            }),
        }
    }

    /// Short description of the underlying handle, for logs.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix",
            #[cfg(unix)]
            IpcStreamInner::Fd(_) => "fd",
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.kind())
            .finish()
    }
}
