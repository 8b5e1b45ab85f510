use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::*;

use crate::byte_stream::ByteStream;
use crate::error::Error;
use crate::raw_message::Address;

/// Opens outbound connections on behalf of a client.
pub trait Connector: Send + Sync {
    type B: ByteStream;
    /// Turn the requested address into the one that is checked and dialed.
    fn resolve(&self, addr: &Address) -> Result<SocketAddr, Error>;
    /// Connect to `addr`, returning the stream and its local address.
    fn connect_byte_stream(&self, addr: SocketAddr) -> Result<(Self::B, SocketAddr), Error>;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    rw_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(rw_timeout: Option<Duration>) -> Self {
        Self { rw_timeout }
    }
}

impl Connector for TcpConnector {
    type B = TcpStream;

    fn resolve(&self, addr: &Address) -> Result<SocketAddr, Error> {
        match addr {
            Address::IpAddr(ip, port) => Ok(SocketAddr::new(*ip, *port)),
            Address::Domain(domain, port) => {
                let not_resolved = || Error::DomainNotResolved {
                    domain: domain.clone(),
                    port: *port,
                };
                let resolved = (domain.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|err| {
                        debug!("resolve {}: {}", addr, err);
                        not_resolved()
                    })?
                    .next()
                    .ok_or_else(not_resolved)?;
                debug!("resolved {} as {}", addr, resolved);
                Ok(resolved)
            }
        }
    }

    fn connect_byte_stream(&self, addr: SocketAddr) -> Result<(Self::B, SocketAddr), Error> {
        let strm = TcpStream::connect(addr).map_err(|err| conn_error(err, addr))?;
        strm.set_read_timeout(self.rw_timeout)?;
        strm.set_write_timeout(self.rw_timeout)?;
        let local = strm.local_addr()?;
        Ok((strm, local))
    }
}

fn conn_error(io_err: io::Error, addr: SocketAddr) -> Error {
    use io::ErrorKind as K;
    match io_err.kind() {
        K::ConnectionRefused => Error::ConnectionRefused { addr },
        K::TimedOut => Error::HostUnreachable { addr: addr.into() },
        _ => io_err.into(),
    }
}
