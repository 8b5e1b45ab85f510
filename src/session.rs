use std::net::SocketAddr;

use log::*;

use crate::byte_stream::ByteStream;
use crate::connector::Connector;
use crate::error::Error;
use crate::model::Endpoint;
use crate::raw_message::*;
use crate::relay::{relay_bytes, Authorize, Relay};
use crate::rw_socks_stream::{ReadWriteStream, SocksStream};

/// SOCKS5 CONNECT handler gated by the access policy.
///
/// Only the no-authentication method and the CONNECT command are served.
#[derive(Debug, Clone)]
pub struct SocksRelay<C> {
    connector: C,
}

impl<C> SocksRelay<C>
where
    C: Connector,
{
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Check the request against `authorize` and dial the destination.
    fn open(
        &self,
        client_addr: SocketAddr,
        req: &ConnectRequest,
        authorize: Authorize,
    ) -> Result<(C::B, SocketAddr, SocketAddr), Error> {
        match req.command {
            Command::Connect => {}
            cmd @ Command::Bind | cmd @ Command::UdpAssociate => {
                return Err(Error::CommandNotSupported { cmd });
            }
        }
        let dst_addr = self.connector.resolve(&req.connect_to)?;
        if !authorize(&Endpoint::host(client_addr), &Endpoint::host(dst_addr)) {
            return Err(Error::ConnectionNotAllowed {
                src: client_addr,
                dst: dst_addr,
            });
        }
        let (conn, local) = self.connector.connect_byte_stream(dst_addr)?;
        Ok((conn, dst_addr, local))
    }
}

impl<S, C> Relay<S> for SocksRelay<C>
where
    S: ByteStream,
    C: Connector + 'static,
{
    fn handle(
        &self,
        mut conn: S,
        client_addr: SocketAddr,
        authorize: Authorize,
    ) -> Result<(), Error> {
        let mut socks = ReadWriteStream::new(&mut conn);

        let select = negotiate_auth_method(&mut socks)?;
        debug!("auth method: {:?}", select);

        let req = match socks.recv_connect_request() {
            Ok(req) => req,
            // nothing to answer on a broken connection
            Err(err @ Error::Io(_)) => return Err(err),
            Err(err) => {
                info!("malformed request from {}: {}", client_addr, err);
                let reply = ConnectReply::failure(SOCKS5, err.reply_code());
                if let Err(send_err) = socks.send_connect_reply(reply) {
                    debug!("reply to malformed request: {}", send_err);
                }
                return Err(err);
            }
        };
        debug!("connect request: {:?}", req);

        let (server_conn, dst_addr) = match self.open(client_addr, &req, authorize) {
            Ok((server_conn, dst_addr, local)) => {
                info!("connected: {} -> {} ({})", client_addr, req.connect_to, dst_addr);
                socks.send_connect_reply(ConnectReply {
                    version: SOCKS5,
                    rep: ResponseCode::Success,
                    bound: local,
                })?;
                (server_conn, dst_addr)
            }
            Err(err) => {
                info!("request rejected: {} -> {}: {}", client_addr, req.connect_to, err);
                socks.send_connect_reply(ConnectReply::failure(SOCKS5, err.reply_code()))?;
                return Err(err);
            }
        };

        relay_bytes(client_addr, dst_addr, &conn, &server_conn)
    }
}

fn negotiate_auth_method(socks: &mut impl SocksStream) -> Result<MethodSelection, Error> {
    let candidates = socks.recv_method_candidates()?;
    trace!("candidates: {:?}", candidates);

    let method = if candidates.methods.contains(&Method::NoAuth) {
        Method::NoAuth
    } else {
        Method::NoMethods
    };
    let selection = MethodSelection {
        version: SOCKS5,
        method,
    };
    socks.send_method_selection(selection)?;
    match selection.method {
        Method::NoMethods => Err(Error::NoAcceptableMethod),
        _ => Ok(selection),
    }
}
