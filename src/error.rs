use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::model::{EmptyEntry, EntryError};
use crate::raw_message::{Address, Command, ResponseCode};

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("address already in use: {addr}")]
    AddressAlreadyInUse { addr: SocketAddr },
    #[error("address not available: {addr}")]
    AddressNotAvailable { addr: SocketAddr },
    /// the listener is broken
    #[error("accept error: {0}")]
    Accept(#[source] io::Error),
    #[error("server has already been started")]
    AlreadyStarted,
    #[error("disconnected channel error: {name}")]
    Disconnected { name: String },
    #[error("message format error: {message}")]
    MessageFormat { message: String },
    #[error("authentication error: no acceptable method")]
    NoAcceptableMethod,
    #[error("command not supported: {cmd:?}")]
    CommandNotSupported { cmd: Command },
    #[error("unknown command: {value:#04x}")]
    UnknownCommand { value: u8 },
    #[error("address type not supported: {value:#04x}")]
    AddrTypeNotSupported { value: u8 },
    #[error("host unreachable: {addr}")]
    HostUnreachable { addr: Address },
    #[error("name not resolved: {domain}:{port}")]
    DomainNotResolved { domain: String, port: u16 },
    /// rejected by the access policy
    #[error("connection not allowed: {src} -> {dst}")]
    ConnectionNotAllowed { src: SocketAddr, dst: SocketAddr },
    /// rejected by the destination host
    #[error("connection refused: {addr}")]
    ConnectionRefused { addr: SocketAddr },
}

impl Error {
    pub fn disconnected<S: Into<String>>(name: S) -> Self {
        Error::Disconnected { name: name.into() }
    }

    pub fn message_fmt(message: fmt::Arguments) -> Self {
        Error::MessageFormat {
            message: message.to_string(),
        }
    }

    /// The reply sent to a SOCKS client whose request failed with `self`.
    pub fn reply_code(&self) -> ResponseCode {
        use Error::*;
        use ResponseCode as R;
        match self {
            NoAcceptableMethod | ConnectionNotAllowed { .. } => R::RuleFailure,
            CommandNotSupported { .. } | UnknownCommand { .. } => R::CommandNotSupported,
            AddrTypeNotSupported { .. } => R::AddrTypeNotSupported,
            HostUnreachable { .. } => R::HostUnreachable,
            DomainNotResolved { .. } => R::NetworkUnreachable,
            ConnectionRefused { .. } => R::ConnectionRefused,
            _ => R::Failure,
        }
    }
}

/// A problem with the configuration. Any of these prevents startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    EmptyEntry(#[from] EmptyEntry),
    #[error("config parse: require listen")]
    MissingListen,
    #[error("config parse: invalid listen address '{addr}': {reason}")]
    InvalidListen { addr: String, reason: String },
    #[error("config parse: nothing is allowed by default")]
    NothingAllowed,
    #[error("config file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("config file '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Every configuration problem found, reported one per line.
#[derive(Debug)]
pub struct ConfigErrors(Vec<ConfigError>);

impl ConfigErrors {
    pub fn errors(&self) -> &[ConfigError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ConfigError> {
        self.0
    }
}

impl From<Vec<ConfigError>> for ConfigErrors {
    fn from(errors: Vec<ConfigError>) -> Self {
        ConfigErrors(errors)
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(error: ConfigError) -> Self {
        ConfigErrors(vec![error])
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}
