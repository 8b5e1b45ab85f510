use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{
    mpsc::{self, Receiver, SyncSender},
    Arc, Mutex,
};
use std::time::Duration;

use log::*;

use crate::byte_stream::ByteStream;
use crate::error::Error;
use crate::tcp_listener_ext::*;

/// A connection accepted by a [`Binder`]'s acceptor, or the error that broke it.
pub type Accepted<S> = Result<(S, SocketAddr), Error>;

/// Create the channel a server uses to stop its acceptor.
///
/// Besides the message, a stop writes to a socket pair so that an acceptor
/// blocked in poll(2) wakes up at once.
pub fn stop_channel() -> Result<(StopSender, StopReceiver), Error> {
    let (tx, rx) = mpsc::sync_channel(1);
    let (wake_tx, wake_rx) = UnixStream::pair()?;
    wake_tx.set_nonblocking(true)?;
    Ok((
        StopSender { tx, wake: wake_tx },
        StopReceiver {
            rx: Arc::new(Mutex::new(rx)),
            wake: Arc::new(wake_rx),
        },
    ))
}

#[derive(Debug)]
pub struct StopSender {
    tx: SyncSender<()>,
    wake: UnixStream,
}

impl StopSender {
    /// Ask the acceptor to stop. Repeated calls are harmless.
    pub fn stop(&self) {
        // a full buffer means a stop request is already pending
        self.tx.try_send(()).ok();
        if let Err(err) = (&self.wake).write(&[1]) {
            trace!("wake acceptor: {}", err);
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopReceiver {
    rx: Arc<Mutex<Receiver<()>>>,
    wake: Arc<UnixStream>,
}

impl StopReceiver {
    /// `true` once the server asked to stop or went away
    pub fn is_requested(&self) -> bool {
        use mpsc::TryRecvError;
        let rx = match self.rx.lock() {
            Ok(rx) => rx,
            Err(_) => return true,
        };
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

impl AsRawFd for StopReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
    rw_timeout: Option<Duration>,
    /// receive termination message
    stop: StopReceiver,
    /// timeout for accept
    accept_timeout: Option<Duration>,
    /// set once the iterator has ended or yielded an accept error
    finished: bool,
}

impl TcpAcceptor {
    fn new(
        listener: TcpListener,
        rw_timeout: Option<Duration>,
        stop: StopReceiver,
        accept_timeout: Option<Duration>,
    ) -> Self {
        Self {
            listener,
            rw_timeout,
            stop,
            accept_timeout,
            finished: false,
        }
    }

    fn set_timeouts(&self, tcp: &TcpStream) -> io::Result<()> {
        tcp.set_read_timeout(self.rw_timeout)?;
        tcp.set_write_timeout(self.rw_timeout)
    }

    fn finish(&mut self) -> Option<Accepted<TcpStream>> {
        debug!("acceptor is requested termination");
        self.finished = true;
        None
    }

    fn fail(&mut self, err: io::Error) -> Option<Accepted<TcpStream>> {
        error!("accept error: {}", err);
        self.finished = true;
        Some(Err(Error::Accept(err)))
    }
}

/// Conditions reported by poll/accept that leave the listener usable.
fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind as K;
    matches!(
        err.kind(),
        K::TimedOut | K::Interrupted | K::WouldBlock | K::ConnectionAborted
    )
}

impl Iterator for TcpAcceptor {
    type Item = Accepted<TcpStream>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.stop.is_requested() {
                return self.finish();
            }
            match self.listener.accept_timeout(self.accept_timeout, &self.stop) {
                Ok(Polled::Woken) => return self.finish(),
                Ok(Polled::Accepted(tcp, addr)) => {
                    if self.stop.is_requested() {
                        debug!("drop connection accepted after stop: {}", addr);
                        return self.finish();
                    }
                    match self.set_timeouts(&tcp) {
                        Ok(()) => return Some(Ok((tcp, addr))),
                        Err(err) if is_transient(&err) => trace!("accept: {}", err),
                        Err(err) => return self.fail(err),
                    }
                }
                Err(err) if is_transient(&err) => {
                    trace!("accept: {}", err);
                }
                Err(err) => return self.fail(err),
            }
        }
    }
}

/// Binds the listen address and produces accepted connections.
///
/// The iterator ends when the acceptor is told to stop. It yields `Err` once
/// if the listener breaks.
pub trait Binder {
    type Stream: ByteStream + 'static;
    type Iter: Iterator<Item = Accepted<Self::Stream>> + Send + 'static;
    fn bind(&self, addr: SocketAddr) -> Result<Self::Iter, Error>;
}

pub struct TcpBinder {
    rw_timeout: Option<Duration>,
    /// receiver for Acceptor termination message
    stop: StopReceiver,
    accept_timeout: Option<Duration>,
}

impl TcpBinder {
    pub fn new(
        rw_timeout: Option<Duration>,
        stop: StopReceiver,
        accept_timeout: Option<Duration>,
    ) -> Self {
        Self {
            rw_timeout,
            stop,
            accept_timeout,
        }
    }
}

impl Binder for TcpBinder {
    type Stream = TcpStream;
    type Iter = TcpAcceptor;
    fn bind(&self, addr: SocketAddr) -> Result<Self::Iter, Error> {
        let tcp = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        tcp.set_reuse_address(true)
            .map_err(|err| addr_error(err, addr))?;
        tcp.bind(&addr.into())
            .map_err(|err| addr_error(err, addr))?;

        // `backlog` is passed to listen(2) as is. Too small a value makes
        // clients fail to connect(2) under load.
        tcp.listen(256)?;
        tcp.set_nonblocking(true)?;

        let listener: TcpListener = tcp.into();
        info!("listening: {}", listener.local_addr()?);
        Ok(TcpAcceptor::new(
            listener,
            self.rw_timeout,
            self.stop.clone(),
            self.accept_timeout,
        ))
    }
}

fn addr_error(io_err: io::Error, addr: SocketAddr) -> Error {
    match io_err.kind() {
        io::ErrorKind::AddrInUse => Error::AddressAlreadyInUse { addr },
        io::ErrorKind::AddrNotAvailable => Error::AddressNotAvailable { addr },
        _ => io_err.into(),
    }
}
