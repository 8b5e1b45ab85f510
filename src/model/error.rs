use std::fmt;

use thiserror::Error;

/// Which half of a rule failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// Malformed endpoint or rule text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid cidr:port '{text}'. Examples: 1.2.3.4/24:80 [2c08::f1]/64:443. Any port: '*'. Error: no '/' found")]
    MissingPrefix { text: String },
    #[error("invalid cidr:port '{text}'. Examples: 1.2.3.4/24:80 [2c08::f1]/64:443. Any port: '*'. Error: no port after '/'")]
    MissingPort { text: String },
    #[error("invalid cidr:port '{text}'. Examples: 1.2.3.4/24:80 [2c08::f1]/64:443. Any port: '*'. Error: {reason}")]
    InvalidCidr { text: String, reason: String },
    #[error("invalid cidr:port '{text}'. Examples: 1.2.3.4/24:80 [2c08::f1]/64:443. Any port: '*'. Error: invalid port '{port}'")]
    InvalidPort { text: String, port: String },
    #[error("rule '{text}' is invalid. Expected 'cidr:port->cidr:port'. Separator '->' not found")]
    MissingArrow { text: String },
    #[error("rule '{text}' has invalid {side}: {source}")]
    InvalidEndpoint {
        text: String,
        side: Side,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    pub(crate) fn invalid_endpoint(text: &str, side: Side, source: ParseError) -> Self {
        ParseError::InvalidEndpoint {
            text: text.to_owned(),
            side,
            source: Box::new(source),
        }
    }
}

/// A rule list entry which could not be parsed.
///
/// Recoverable: sibling entries of the same list are still parsed and added.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config parse: name={label} item={item} error={source}")]
pub struct EntryError {
    pub label: String,
    pub item: String,
    #[source]
    pub source: ParseError,
}

/// A rule list with an empty entry, e.g. `a->b,,c->d`.
///
/// Unlike [`EntryError`] this means the list itself is malformed,
/// so it aborts parsing of the whole configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config parse: name={label} has invalid empty value. value='{value}'")]
pub struct EmptyEntry {
    pub label: String,
    pub value: String,
}
