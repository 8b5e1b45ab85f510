use std::net::SocketAddr;
use std::sync::{
    mpsc::{self, Receiver, SyncSender},
    Arc, Mutex, PoisonError,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use derive_more::{Display, From};
use log::*;

use crate::acceptor::{stop_channel, Accepted, Binder, StopSender, TcpBinder};
use crate::byte_stream::ByteStream;
use crate::config::ServerConfig;
use crate::connector::TcpConnector;
use crate::error::Error;
use crate::policy::AccessPolicy;
use crate::relay::Relay;
use crate::server_command::{ServerCommand, Termination};
use crate::session::SocksRelay;
use crate::thread::spawn_thread;
use crate::work_tracker::{WorkGuard, WorkTracker};

/// pending commands; extra termination requests must not block the sender
const COMMAND_BUFFER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Display)]
#[display(fmt = "ConnId({})", _0)]
pub struct ConnId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LifecycleState {
    /// not started yet
    Idle,
    /// accepting connections
    Running,
    /// no longer accepting; waiting for outstanding connections
    Draining,
    /// `serve` has returned
    Stopped,
}

/// Read-only view of a server's [`LifecycleState`], usable from other threads.
#[derive(Debug, Clone)]
pub struct StateWatcher(Arc<Mutex<LifecycleState>>);

impl StateWatcher {
    fn new() -> Self {
        StateWatcher(Arc::new(Mutex::new(LifecycleState::Idle)))
    }

    pub fn get(&self) -> LifecycleState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: LifecycleState) {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("server state: {} -> {}", *current, state);
        *current = state;
    }
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub termination: Termination,
    /// from the termination request until `serve` returned
    pub elapsed: Duration,
    /// connections still running when the grace period ran out
    pub outstanding: usize,
}

impl ShutdownReport {
    pub fn exit_code(&self) -> i32 {
        self.termination.exit_code
    }

    /// every connection finished within the grace period
    pub fn is_clean(&self) -> bool {
        self.outstanding == 0
    }
}

pub struct Server<T, R> {
    config: ServerConfig,
    tx_cmd: SyncSender<ServerCommand>,
    rx_cmd: Receiver<ServerCommand>,
    /// bind server address
    binder: T,
    /// stops the acceptor
    acceptor_stop: StopSender,
    /// serves accepted connections
    relay: Arc<R>,
    tracker: WorkTracker,
    state: StateWatcher,
}

/// spawn a thread which hands each accepted connection to a new worker
fn spawn_acceptor<S, R>(
    acceptor: impl Iterator<Item = Accepted<S>> + Send + 'static,
    tx: SyncSender<ServerCommand>,
    relay: Arc<R>,
    policy: Arc<AccessPolicy>,
    tracker: WorkTracker,
) -> Result<JoinHandle<()>, Error>
where
    S: ByteStream + 'static,
    R: Relay<S>,
{
    spawn_thread("acceptor", move || {
        let mut next_id = 0u64;
        for accepted in acceptor {
            match accepted {
                Ok((strm, addr)) => {
                    info!("accept() remote={}", addr);
                    let id = ConnId::from(next_id);
                    next_id += 1;
                    let guard = tracker.start();
                    let spawned =
                        spawn_session(id, strm, addr, relay.clone(), policy.clone(), guard);
                    if let Err(err) = spawned {
                        error!("{}: failed to spawn session: {}", id, err);
                    }
                }
                Err(err) => {
                    if tx.send(ServerCommand::Abort(err)).is_err() {
                        info!("disconnected ServerCommand chan");
                    }
                    break;
                }
            }
        }
        debug!("acceptor stopped");
    })
}

/// spawn a thread running `relay` on one connection
///
/// `guard` is released when the thread ends, whatever the outcome.
fn spawn_session<S, R>(
    id: ConnId,
    strm: S,
    addr: SocketAddr,
    relay: Arc<R>,
    policy: Arc<AccessPolicy>,
    guard: WorkGuard,
) -> Result<JoinHandle<()>, Error>
where
    S: ByteStream + 'static,
    R: Relay<S>,
{
    spawn_thread("session", move || {
        let _guard = guard;
        match relay.handle(strm, addr, &|src, dst| policy.decide(src, dst)) {
            Ok(()) => debug!("{}: session finished: {}", id, addr),
            Err(err) => info!("{}: session error: {}: {}", id, addr, err),
        }
    })
}

impl Server<TcpBinder, SocksRelay<TcpConnector>> {
    pub fn new(config: ServerConfig) -> Result<(Self, SyncSender<ServerCommand>), Error> {
        let (stop, stop_rx) = stop_channel()?;
        let binder = TcpBinder::new(config.client_rw_timeout, stop_rx, config.accept_timeout);
        let relay = SocksRelay::new(TcpConnector::new(config.server_rw_timeout));
        Ok(Server::with_binder(config, binder, stop, relay))
    }
}

impl<T, R> Server<T, R>
where
    T: Binder,
    R: Relay<T::Stream>,
{
    /// Build a server from parts.
    ///
    /// * `acceptor_stop`
    ///   Sender side of the stop channel the binder's acceptor listens on.
    pub fn with_binder(
        config: ServerConfig,
        binder: T,
        acceptor_stop: StopSender,
        relay: R,
    ) -> (Self, SyncSender<ServerCommand>) {
        let (tx, rx) = mpsc::sync_channel(COMMAND_BUFFER);
        (
            Self {
                config,
                tx_cmd: tx.clone(),
                rx_cmd: rx,
                binder,
                acceptor_stop,
                relay: Arc::new(relay),
                tracker: WorkTracker::new(),
                state: StateWatcher::new(),
            },
            tx,
        )
    }

    pub fn state_watcher(&self) -> StateWatcher {
        self.state.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept and serve connections until a [`ServerCommand`] stops the server.
    ///
    /// Returns the shutdown report on `Terminate`. Bind failures and broken
    /// listeners are returned as errors. A server runs at most once.
    pub fn serve(&mut self) -> Result<ShutdownReport, Error> {
        if self.state.get() != LifecycleState::Idle {
            return Err(Error::AlreadyStarted);
        }
        let accept_th = self.start().map_err(|err| {
            error!("server start error: {}", err);
            self.state.set(LifecycleState::Stopped);
            err
        })?;

        let cmd = self
            .rx_cmd
            .recv()
            .map_err(|_| Error::disconnected("server command"));
        info!("cmd: {:?}", cmd);
        match cmd {
            Ok(ServerCommand::Terminate(termination)) => Ok(self.terminate(termination, accept_th)),
            Ok(ServerCommand::Abort(err)) => {
                error!("server error: {}", err);
                self.stop_acceptor(accept_th);
                self.state.set(LifecycleState::Stopped);
                Err(err)
            }
            Err(err) => {
                self.stop_acceptor(accept_th);
                self.state.set(LifecycleState::Stopped);
                Err(err)
            }
        }
    }

    fn start(&mut self) -> Result<JoinHandle<()>, Error> {
        let acceptor = self.binder.bind(self.config.listen)?;
        self.state.set(LifecycleState::Running);
        info!("server started: {}", self.config);
        spawn_acceptor(
            acceptor,
            self.tx_cmd.clone(),
            self.relay.clone(),
            self.config.policy.clone(),
            self.tracker.clone(),
        )
    }

    /// signal the acceptor, then wait for it to drop the listener
    fn stop_acceptor(&self, accept_th: JoinHandle<()>) {
        trace!("stopping accept thread...");
        self.acceptor_stop.stop();
        if accept_th.join().is_err() {
            error!("accept thread panicked");
        }
        trace!("accept thread is stopped");
    }

    fn terminate(&self, termination: Termination, accept_th: JoinHandle<()>) -> ShutdownReport {
        let begin = Instant::now();
        info!("terminating: {}", termination);
        self.state.set(LifecycleState::Draining);
        self.stop_acceptor(accept_th);

        let remaining = termination.timeout.saturating_sub(begin.elapsed());
        let outstanding = self.tracker.wait_idle(remaining);
        let elapsed = begin.elapsed();
        info!("remaining work finished in {:?}", elapsed);
        if outstanding > 0 {
            warn!("{} connections still active after {:?}", outstanding, elapsed);
        }
        self.state.set(LifecycleState::Stopped);
        ShutdownReport {
            termination,
            elapsed,
            outstanding,
        }
    }
}
