//! This crate provides a [SOCKS5](https://www.rfc-editor.org/rfc/rfc1928) proxy server which
//! relays a connection only if its source and destination are permitted by allow/deny rules.
//!
//! # Feature
//! ## Authentication
//!
//! Any authentication method is not supported.
//!
//! The client connects to the server is required for sending `X'00'` (`NO AUTHENTICATION REQUIRED`) as a method selection message.
//!
//! ## Command
//!
//! Only `CONNECT` command is supported.
//! Domain names are resolved by the proxy before the rules are checked.
//!
//! ## Access rules
//!
//! A rule is written `cidr:port->cidr:port`, source first. Port `*` matches any port.
//! IPv6 networks are written in brackets.
//!
//! ```text
//! 10.0.0.0/8:*->0.0.0.0/0:443
//! [2c08::]/64:*->[2c08:1::]/32:*
//! ```
//!
//! A connection is relayed iff some `allow` rule matches it and no `deny` rule does.
//!
//! ## Shutdown
//!
//! [`ServerCommand::Terminate`] stops accepting, closes the listener and waits a bounded time
//! for the connections in flight.
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use std::thread;
//! use sockguard::*;
//!
//! let settings = Settings {
//!     listen: Some("127.0.0.1:0".to_owned()),
//!     allow: vec!["127.0.0.0/8:*->0.0.0.0/0:*".to_owned()],
//!     ..Settings::default()
//! };
//! let config = settings.build().unwrap();
//! let termination = config.graceful();
//! let (mut server, tx) = Server::new(config).unwrap();
//! let th = thread::spawn(move || server.serve());
//! thread::sleep(Duration::from_millis(500));
//! tx.send(ServerCommand::Terminate(termination)).unwrap();
//! let report = th.join().unwrap().unwrap();
//! assert_eq!(report.exit_code(), 0);
//! ```

pub mod acceptor;
mod byte_stream;
pub mod config;
pub mod connector;
pub mod error;
pub mod model;
mod policy;
pub mod raw_message;
pub mod relay;
mod rw_socks_stream;
pub mod server;
pub mod server_command;
mod session;
mod tcp_listener_ext;
mod test;
mod thread;
mod work_tracker;

pub use byte_stream::ByteStream;
pub use config::*;
pub use error::{ConfigError, ConfigErrors, Error};
pub use model::{Endpoint, Rule, RuleSet};
pub use policy::AccessPolicy;
pub use relay::Relay;
pub use server::*;
pub use server_command::*;
pub use session::SocksRelay;
