use std::thread::{self, JoinHandle};

use crate::error::Error;

/// spawn `name`d thread performs `f`
pub fn spawn_thread<F, R>(name: &str, f: F) -> Result<JoinHandle<R>, Error>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_owned()).spawn(f)?)
}

/// name of the calling thread, for log lines
pub fn current_name() -> String {
    thread::current()
        .name()
        .unwrap_or("<anonymous>")
        .to_owned()
}
