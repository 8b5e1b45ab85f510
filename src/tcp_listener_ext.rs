use std::convert::TryFrom;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};

/// Result of waiting on a listener.
#[derive(Debug)]
pub enum Polled {
    Accepted(TcpStream, SocketAddr),
    /// `wake` became readable or hung up before a connection was taken
    Woken,
}

pub trait TcpListenerExt {
    fn accept_timeout(
        &self,
        timeout: Option<Duration>,
        wake: &impl AsRawFd,
    ) -> io::Result<Polled>;
}

impl TcpListenerExt for TcpListener {
    /// accept(2) with timeout
    ///
    /// * `timeout`
    ///   Timeout for _accept_. If the value is `None`, wait connection indefinitely.
    ///   An expired timeout is reported as `ErrorKind::TimedOut`.
    /// * `wake`
    ///   Polled together with the listener. Any event on it wins over a
    ///   pending connection.
    fn accept_timeout(
        &self,
        timeout: Option<Duration>,
        wake: &impl AsRawFd,
    ) -> io::Result<Polled> {
        let mut fds = [
            PollFd::new(self.as_raw_fd(), PollFlags::POLLIN),
            PollFd::new(wake.as_raw_fd(), PollFlags::POLLIN),
        ];
        let ready = poll(&mut fds, timeout_ms(timeout)).map_err(io::Error::from)?;
        if ready == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "poll accept"));
        }
        if fds[1].revents().map_or(false, |ev| !ev.is_empty()) {
            return Ok(Polled::Woken);
        }
        let (strm, addr) = self.accept()?;
        // the listener is non-blocking; the accepted stream should not be
        strm.set_nonblocking(false)?;
        Ok(Polled::Accepted(strm, addr))
    }
}

/// poll(2) timeout in milliseconds; -1 waits forever
fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        Some(dur) => i32::try_from(dur.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    }
}
