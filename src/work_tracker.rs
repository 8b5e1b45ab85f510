use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::*;

/// Counts connections that are still being served.
///
/// Each worker holds a [`WorkGuard`] for as long as it runs; dropping the
/// guard (normally, on error, or while unwinding) takes it off the count.
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // the count is a plain integer, so a poisoned lock still holds a valid value
    fn count(&self) -> MutexGuard<'_, usize> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register one more unit of work.
    pub fn start(&self) -> WorkGuard {
        *self.count() += 1;
        WorkGuard {
            tracker: self.clone(),
        }
    }

    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        *self.count()
    }

    /// Block until nothing is outstanding or `timeout` has elapsed.
    /// Returns the number of workers still running.
    pub fn wait_idle(&self, timeout: Duration) -> usize {
        let (_, idle) = &*self.inner;
        let (count, result) = idle
            .wait_timeout_while(self.count(), timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() {
            trace!("wait_idle timed out: outstanding={}", *count);
        }
        *count
    }

    fn finish(&self) {
        let mut count = self.count();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.1.notify_all();
        }
    }
}

/// Decrements the [`WorkTracker`] it came from when dropped.
#[derive(Debug)]
pub struct WorkGuard {
    tracker: WorkTracker,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.tracker.finish();
    }
}
