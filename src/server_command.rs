//! Server control command
use std::fmt;
use std::time::Duration;

use crate::error::Error;

#[derive(Debug)]
pub enum ServerCommand {
    /// stop accepting and drain outstanding connections
    Terminate(Termination),
    /// the acceptor failed; stop with this error
    Abort(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    /// SIGINT: short grace period, failure exit code
    Interrupt,
    /// SIGTERM: long grace period, success exit code
    Graceful,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TerminationKind::Interrupt => write!(f, "SIGINT"),
            TerminationKind::Graceful => write!(f, "SIGTERM"),
        }
    }
}

/// How a termination request should be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub kind: TerminationKind,
    /// grace period for outstanding connections
    pub timeout: Duration,
    /// process exit code once the server has stopped
    pub exit_code: i32,
}

impl Termination {
    pub fn interrupt(timeout: Duration) -> Self {
        Self {
            kind: TerminationKind::Interrupt,
            timeout,
            exit_code: 1,
        }
    }

    pub fn graceful(timeout: Duration) -> Self {
        Self {
            kind: TerminationKind::Graceful,
            timeout,
            exit_code: 0,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (timeout={:?})", self.kind, self.timeout)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_codes() {
        let int = Termination::interrupt(Duration::from_secs(1));
        assert_eq!(int.exit_code, 1);
        assert_eq!(int.to_string(), "SIGINT (timeout=1s)");
        let term = Termination::graceful(Duration::from_secs(5));
        assert_eq!(term.exit_code, 0);
        assert_eq!(term.kind, TerminationKind::Graceful);
    }
}
