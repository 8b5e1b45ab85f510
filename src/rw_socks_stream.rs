use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::slice;

use log::*;

use crate::error::Error;
use crate::raw_message::*;

trait ReadSocksExt {
    fn read_u8(&mut self) -> Result<u8, Error>;
    fn read_u16(&mut self) -> Result<u16, Error>;
    fn read_rsv(&mut self) -> Result<u8, Error>;
    fn read_version(&mut self) -> Result<ProtocolVersion, Error>;
    fn read_methods(&mut self) -> Result<Vec<Method>, Error>;
    fn read_cmd(&mut self) -> Result<Command, Error>;
    fn read_address(&mut self) -> Result<Address, Error>;
}

trait WriteSocksExt {
    fn write_u8(&mut self, v: u8) -> Result<(), Error>;
    fn write_u16(&mut self, v: u16) -> Result<(), Error>;
    fn write_socket_addr(&mut self, addr: &SocketAddr) -> Result<(), Error>;
}

impl<T> ReadSocksExt for T
where
    T: io::Read,
{
    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_rsv(&mut self) -> Result<u8, Error> {
        let rsv = self.read_u8()?;
        if rsv != RESERVED {
            Err(Error::message_fmt(format_args!(
                "value of rsv is not 0({})",
                rsv
            )))
        } else {
            Ok(rsv)
        }
    }

    fn read_version(&mut self) -> Result<ProtocolVersion, Error> {
        let version: ProtocolVersion = self.read_u8()?.into();
        if version != SOCKS5 {
            return Err(Error::message_fmt(format_args!(
                "unsupported protocol version: {}",
                version
            )));
        }
        Ok(version)
    }

    /// NMETHODS followed by METHODS
    fn read_methods(&mut self) -> Result<Vec<Method>, Error> {
        let nmethods = self.read_u8()? as usize;
        let mut methods = vec![0u8; nmethods];
        self.read_exact(&mut methods)?;
        Ok(methods.into_iter().map(Into::into).collect())
    }

    fn read_cmd(&mut self) -> Result<Command, Error> {
        let value = self.read_u8()?;
        Command::try_from(value).map_err(|_| Error::UnknownCommand { value })
    }

    /// ATYP, DST.ADDR and DST.PORT
    fn read_address(&mut self) -> Result<Address, Error> {
        let value = self.read_u8()?;
        let atyp =
            AddrType::try_from(value).map_err(|_| Error::AddrTypeNotSupported { value })?;
        match atyp {
            AddrType::V4 => {
                let mut buf = [0u8; 4];
                self.read_exact(&mut buf)?;
                let ip = IpAddr::from(Ipv4Addr::from(buf));
                Ok(Address::IpAddr(ip, self.read_u16()?))
            }
            AddrType::V6 => {
                let mut buf = [0u8; 16];
                self.read_exact(&mut buf)?;
                let ip = IpAddr::from(Ipv6Addr::from(buf));
                Ok(Address::IpAddr(ip, self.read_u16()?))
            }
            AddrType::Domain => {
                let len = self.read_u8()? as usize;
                let mut buf = vec![0u8; len];
                self.read_exact(&mut buf)?;
                let domain = String::from_utf8(buf).map_err(|err| {
                    Error::message_fmt(format_args!("domain name is not utf-8: {}", err))
                })?;
                Ok(Address::Domain(domain, self.read_u16()?))
            }
        }
    }
}

impl<T> WriteSocksExt for T
where
    T: io::Write,
{
    fn write_u8(&mut self, v: u8) -> Result<(), Error> {
        self.write_all(slice::from_ref(&v))?;
        Ok(())
    }

    fn write_u16(&mut self, v: u16) -> Result<(), Error> {
        self.write_all(&v.to_be_bytes())?;
        Ok(())
    }

    /// ATYP, BND.ADDR and BND.PORT
    fn write_socket_addr(&mut self, addr: &SocketAddr) -> Result<(), Error> {
        match addr.ip() {
            IpAddr::V4(ip) => {
                self.write_u8(AddrType::V4 as u8)?;
                self.write_all(&ip.octets())?;
            }
            IpAddr::V6(ip) => {
                self.write_u8(AddrType::V6 as u8)?;
                self.write_all(&ip.octets())?;
            }
        }
        self.write_u16(addr.port())
    }
}

/// The server side of the SOCKS5 negotiation.
pub trait SocksStream {
    fn recv_method_candidates(&mut self) -> Result<MethodCandidates, Error>;
    fn send_method_selection(&mut self, selection: MethodSelection) -> Result<(), Error>;
    fn recv_connect_request(&mut self) -> Result<ConnectRequest, Error>;
    fn send_connect_reply(&mut self, reply: ConnectReply) -> Result<(), Error>;
}

/// Wrapper of Read/Write stream for impl SocksStream.
pub struct ReadWriteStream<T> {
    strm: T,
}

impl<T: fmt::Debug> fmt::Debug for ReadWriteStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReadWriteStream({:?})", self.strm)
    }
}

impl<T> ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    pub fn new(strm: T) -> Self {
        Self { strm }
    }
}

impl<T> SocksStream for ReadWriteStream<T>
where
    T: io::Read + io::Write,
{
    fn recv_method_candidates(&mut self) -> Result<MethodCandidates, Error> {
        trace!("recv_method_candidates");
        let version = self.strm.read_version()?;
        let methods = self.strm.read_methods()?;
        Ok(MethodCandidates { version, methods })
    }

    fn send_method_selection(&mut self, selection: MethodSelection) -> Result<(), Error> {
        trace!("send_method_selection: {:?}", selection);
        let buf = [selection.version.into(), selection.method.code()];
        self.strm.write_all(&buf)?;
        self.strm.flush()?;
        Ok(())
    }

    fn recv_connect_request(&mut self) -> Result<ConnectRequest, Error> {
        trace!("recv_connect_request");
        let version = self.strm.read_version()?;
        let command = self.strm.read_cmd()?;
        self.strm.read_rsv()?;
        let connect_to = self.strm.read_address()?;
        Ok(ConnectRequest {
            version,
            command,
            connect_to,
        })
    }

    fn send_connect_reply(&mut self, reply: ConnectReply) -> Result<(), Error> {
        trace!("send_connect_reply: {:?}", reply);
        // written in one go so the client sees the whole reply in a single read
        let mut buf = Vec::with_capacity(22);
        buf.write_u8(reply.version.into())?;
        buf.write_u8(reply.rep.code())?;
        buf.write_u8(RESERVED)?;
        buf.write_socket_addr(&reply.bound)?;
        self.strm.write_all(&buf)?;
        self.strm.flush()?;
        Ok(())
    }
}
