#![cfg(test)]
//! Drive a real server with a SOCKS5 client.
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socks::Socks5Stream;

use crate::config::Settings;
use crate::error::Error;
use crate::server::{LifecycleState, Server, ShutdownReport, StateWatcher};
use crate::server_command::{ServerCommand, Termination};

/// echo server on an ephemeral port
fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for strm in listener.incoming() {
            let mut strm = strm.unwrap();
            thread::spawn(move || {
                let mut rd = strm.try_clone().unwrap();
                io::copy(&mut rd, &mut strm).ok();
            });
        }
    });
    addr
}

fn free_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

struct Proxy {
    addr: SocketAddr,
    tx: std::sync::mpsc::SyncSender<ServerCommand>,
    watcher: StateWatcher,
    th: JoinHandle<Result<ShutdownReport, Error>>,
}

impl Proxy {
    fn start(allow: &str, deny: &str) -> Self {
        Self::start_with(allow, deny, Duration::from_millis(200))
    }

    fn start_with(allow: &str, deny: &str, accept_timeout: Duration) -> Self {
        let addr = free_addr();
        let settings = Settings {
            listen: Some(addr.to_string()),
            allow: vec![allow.to_owned()],
            deny: vec![deny.to_owned()],
            ..Settings::default()
        };
        let mut config = settings.build().unwrap();
        config
            .set_client_rw_timeout(Some(Duration::from_millis(200)))
            .set_server_rw_timeout(Some(Duration::from_millis(200)))
            .set_accept_timeout(Some(accept_timeout));
        let (mut server, tx) = Server::new(config).unwrap();
        let watcher = server.state_watcher();
        let th = thread::spawn(move || server.serve());
        while watcher.get() == LifecycleState::Idle {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(watcher.get(), LifecycleState::Running);
        Proxy {
            addr,
            tx,
            watcher,
            th,
        }
    }

    fn stop(self) -> ShutdownReport {
        self.tx
            .send(ServerCommand::Terminate(Termination::graceful(
                Duration::from_secs(5),
            )))
            .unwrap();
        self.th.join().unwrap().unwrap()
    }
}

fn echo_through(proxy: SocketAddr, target: SocketAddr, msg: &[u8]) -> io::Result<Vec<u8>> {
    let mut conn = Socks5Stream::connect(proxy, target)?;
    conn.write_all(msg)?;
    let mut buf = vec![0u8; msg.len()];
    conn.read_exact(&mut buf)?;
    Ok(buf)
}

#[test]
fn relay_allowed_target() {
    let echo = echo_server();
    let proxy = Proxy::start(&format!("127.0.0.0/8:*->127.0.0.1/32:{}", echo.port()), "");

    let echoed = echo_through(proxy.addr, echo, b"hello sockguard").unwrap();
    assert_eq!(&echoed[..], b"hello sockguard");

    let report = proxy.stop();
    assert!(report.is_clean());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn reject_denied_target() {
    let allowed = echo_server();
    let denied = echo_server();
    let proxy = Proxy::start(
        "127.0.0.0/8:*->127.0.0.0/8:*",
        &format!("127.0.0.0/8:*->127.0.0.1/32:{}", denied.port()),
    );

    assert!(echo_through(proxy.addr, denied, b"hello").is_err());
    assert_eq!(&echo_through(proxy.addr, allowed, b"hello").unwrap()[..], b"hello");

    assert!(proxy.stop().is_clean());
}

#[test]
fn reject_unlisted_target() {
    let echo = echo_server();
    // only port 1 is allowed
    let proxy = Proxy::start("127.0.0.0/8:*->127.0.0.1/32:1", "");
    assert!(echo_through(proxy.addr, echo, b"hello").is_err());
    assert!(proxy.stop().is_clean());
}

#[test]
fn stop_accepting_after_terminate() {
    let proxy = Proxy::start("127.0.0.0/8:*->127.0.0.0/8:*", "");
    let addr = proxy.addr;
    proxy.stop();
    // the listener has been closed
    assert!(std::net::TcpStream::connect(addr).is_err());
}

#[test]
fn refuse_connection_while_draining() {
    let echo = echo_server();
    // a long accept timeout; the stop request must not wait for it
    let proxy = Proxy::start_with(
        "127.0.0.0/8:*->127.0.0.0/8:*",
        "",
        Duration::from_secs(2),
    );
    // keep one session open so that the server stays in Draining
    let mut busy = Socks5Stream::connect(proxy.addr, echo).unwrap();
    busy.write_all(b"busy").unwrap();
    let mut buf = [0u8; 4];
    busy.read_exact(&mut buf).unwrap();

    proxy
        .tx
        .send(ServerCommand::Terminate(Termination::graceful(
            Duration::from_secs(5),
        )))
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(proxy.watcher.get(), LifecycleState::Draining);
    assert!(echo_through(proxy.addr, echo, b"after terminate").is_err());

    drop(busy);
    let report = proxy.th.join().unwrap().unwrap();
    assert!(report.is_clean());
    assert!(report.elapsed < Duration::from_secs(2));
}

#[test]
fn short_grace_period_is_not_stretched_by_accept_timeout() {
    let proxy = Proxy::start_with(
        "127.0.0.0/8:*->127.0.0.0/8:*",
        "",
        Duration::from_secs(10),
    );
    proxy
        .tx
        .send(ServerCommand::Terminate(Termination::interrupt(
            Duration::from_millis(50),
        )))
        .unwrap();
    let report = proxy.th.join().unwrap().unwrap();
    assert_eq!(report.exit_code(), 1);
    assert!(report.elapsed < Duration::from_secs(1));
}
