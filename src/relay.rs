use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::*;

use crate::byte_stream::ByteStream;
use crate::error::Error;
use crate::model::Endpoint;
use crate::thread::{current_name, spawn_thread};

/// Decides whether `src` may reach `dst`.
pub type Authorize<'a> = &'a dyn Fn(&Endpoint, &Endpoint) -> bool;

/// Serves one accepted connection to completion.
///
/// The handler negotiates with the client, consults `authorize` for the
/// requested destination and then moves bytes until either side is done.
/// The connection counts as outstanding work for as long as `handle` runs.
pub trait Relay<S>: Send + Sync + 'static {
    fn handle(&self, conn: S, client_addr: SocketAddr, authorize: Authorize) -> Result<(), Error>;
}

/// Pump bytes in both directions until one of them finishes.
///
/// client -> server runs on a thread named "outbound", client <- server
/// on the calling thread. A half that times out checks whether the
/// other one is gone and stops if so.
pub fn relay_bytes(
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    client_conn: &impl ByteStream,
    server_conn: &impl ByteStream,
) -> Result<(), Error> {
    let (read_client, write_client) = client_conn.split()?;
    let (read_server, write_server) = server_conn.split()?;
    let finished = Arc::new(AtomicBool::new(false));

    let outbound_th = {
        let finished = finished.clone();
        spawn_thread("outbound", move || {
            let result = relay_half(&finished, client_addr, server_addr, read_client, write_server);
            finished.store(true, Ordering::Relaxed);
            result
        })?
    };
    let incoming = relay_half(&finished, server_addr, client_addr, read_server, write_client);
    finished.store(true, Ordering::Relaxed);

    let outbound = outbound_th
        .join()
        .map_err(|_| Error::disconnected("outbound"))?;
    incoming.and(outbound)
}

fn relay_half(
    finished: &AtomicBool,
    src_addr: SocketAddr,
    dst_addr: SocketAddr,
    mut src: impl io::Read,
    mut dst: impl io::Write,
) -> Result<(), Error> {
    let name = current_name();
    debug!("relay: {}: {} ==> {}", name, src_addr, dst_addr);
    loop {
        use io::ErrorKind as K;
        match io::copy(&mut src, &mut dst) {
            Ok(0) => {
                debug!("relay finished: {}: {} ==> {}", name, src_addr, dst_addr);
                return Ok(());
            }
            Ok(size) => trace!("{}: {} ==> {}: {} bytes", name, src_addr, dst_addr, size),
            Err(err) if err.kind() == K::WouldBlock || err.kind() == K::TimedOut => {
                if finished.load(Ordering::Relaxed) {
                    // the other direction is closed
                    return Ok(());
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}
