use std::fmt;
use std::io;
use std::net::TcpStream;

use crate::error::Error;

pub type ReadHalf = Box<dyn io::Read + Send>;
pub type WriteHalf = Box<dyn io::Write + Send>;

/// A connection the proxy reads from and writes to.
///
/// `split` yields independent halves so that both directions can be pumped
/// from different threads.
pub trait ByteStream: fmt::Debug + io::Read + io::Write + Send {
    fn split(&self) -> Result<(ReadHalf, WriteHalf), Error>;
}

impl ByteStream for TcpStream {
    fn split(&self) -> Result<(ReadHalf, WriteHalf), Error> {
        let rd = self.try_clone()?;
        let wr = self.try_clone()?;
        Ok((Box::new(rd), Box::new(wr)))
    }
}
