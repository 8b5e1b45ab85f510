//! RFC1928 SOCKS Protocol Version 5 messages understood by [`SocksRelay`].
//!
//! ```text
//! client            proxy            service
//!   |                 |                 |
//!   |---------------->|                 |
//!   |MethodCandidates |                 |
//!   |<----------------|                 |
//!   |  MethodSelection|                 |
//!   |---------------->|                 |
//!   |ConnectRequest   |                 |
//!   |          [[ AccessPolicy ]]       |
//!   |<----------------|                 |
//!   |     ConnectReply|                 |
//!   | - - - - - - - ->| - - - - - - - ->|
//!   |            [[ Relay ]]            |
//!   |<- - - - - - - - |< - - - - - - - -|
//! ```
//!
//! [`SocksRelay`]: crate::session::SocksRelay
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use derive_more::{Display, From, Into};
use thiserror::Error;

pub const RESERVED: u8 = 0x00;

pub const SOCKS5: ProtocolVersion = ProtocolVersion(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Into, From, Display)]
pub struct ProtocolVersion(u8);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("try from u8({value:#X}) error to {to}")]
pub struct TryFromU8Error {
    /// source value
    value: u8,
    /// target type
    to: &'static str,
}

/// Authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Method {
    /// No Authentication
    NoAuth,
    /// GSSAPI
    GssApi,
    /// Authenticate with a username / password
    UserPass,
    /// IANA assigned method
    IanaAssigned(u8),
    /// Reserved for private method
    Private(u8),
    /// No acceptable method
    NoMethods,
}

impl Method {
    pub fn code(&self) -> u8 {
        use Method::*;
        match self {
            NoAuth => 0x00,
            GssApi => 0x01,
            UserPass => 0x02,
            IanaAssigned(c) | Private(c) => *c,
            NoMethods => 0xff,
        }
    }
}

impl From<u8> for Method {
    fn from(code: u8) -> Self {
        use Method::*;
        match code {
            0x00 => NoAuth,
            0x01 => GssApi,
            0x02 => UserPass,
            0x03..=0x7F => IanaAssigned(code),
            0x80..=0xFE => Private(code),
            0xFF => NoMethods,
        }
    }
}

/// CMD
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = TryFromU8Error;
    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Command::Connect),
            2 => Ok(Command::Bind),
            3 => Ok(Command::UdpAssociate),
            _ => Err(TryFromU8Error {
                value: n,
                to: "Command",
            }),
        }
    }
}

/// ATYP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddrType {
    V4 = 0x01,
    Domain = 0x03,
    V6 = 0x04,
}

impl TryFrom<u8> for AddrType {
    type Error = TryFromU8Error;
    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(AddrType::V4),
            3 => Ok(AddrType::Domain),
            4 => Ok(AddrType::V6),
            _ => Err(TryFromU8Error {
                value: n,
                to: "AddrType",
            }),
        }
    }
}

/// The target of a request as the client sent it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    IpAddr(IpAddr, u16),
    Domain(String, u16),
}

impl Address {
    pub fn port(&self) -> u16 {
        match self {
            Address::IpAddr(_, port) | Address::Domain(_, port) => *port,
        }
    }

    pub fn atyp(&self) -> AddrType {
        match self {
            Address::IpAddr(IpAddr::V4(_), _) => AddrType::V4,
            Address::IpAddr(IpAddr::V6(_), _) => AddrType::V6,
            Address::Domain(..) => AddrType::Domain,
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::IpAddr(addr.ip(), addr.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::IpAddr(addr @ IpAddr::V4(_), port) => write!(f, "{}:{}", addr, port),
            Address::IpAddr(addr @ IpAddr::V6(_), port) => write!(f, "[{}]:{}", addr, port),
            Address::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// REP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseCode {
    Success = 0x00,
    Failure = 0x01,
    RuleFailure = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddrTypeNotSupported = 0x08,
}

impl ResponseCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ResponseCode::*;
        match self {
            Success => write!(f, "succeeded"),
            Failure => write!(f, "general SOCKS server failure"),
            RuleFailure => write!(f, "connection not allowed by ruleset"),
            NetworkUnreachable => write!(f, "Network unreachable"),
            HostUnreachable => write!(f, "Host unreachable"),
            ConnectionRefused => write!(f, "Connection refused"),
            TtlExpired => write!(f, "TTL expired"),
            CommandNotSupported => write!(f, "Command not supported"),
            AddrTypeNotSupported => write!(f, "Address type not supported"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCandidates {
    pub version: ProtocolVersion,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSelection {
    pub version: ProtocolVersion,
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub version: ProtocolVersion,
    pub command: Command,
    pub connect_to: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub version: ProtocolVersion,
    pub rep: ResponseCode,
    /// BND.ADDR and BND.PORT
    pub bound: SocketAddr,
}

impl ConnectReply {
    /// reply carrying no bound address
    pub fn failure(version: ProtocolVersion, rep: ResponseCode) -> Self {
        Self {
            version,
            rep,
            bound: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        }
    }
}
