//! `poll(2)`-based readiness checks for raw descriptors.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Block until `fd` is readable (or hung up) or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout. `EINTR` restarts the wait with whatever
/// time is left.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now().checked_add(timeout);

    loop {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_millis(remaining)) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        // POLLHUP/POLLERR count as ready: the following read reports EOF or the error.
        return Ok(rc > 0 && pfd.revents != 0);
    }
}

/// Round up to whole milliseconds so short waits never become a busy poll.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
