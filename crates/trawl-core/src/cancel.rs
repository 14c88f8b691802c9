//! Cooperative cancellation for running queries.
//!
//! A query hands clones of one [`CancellationToken`] to its entry source and
//! to the content scanner. Long-running loops call [`CancellationToken::checkpoint`]
//! at each step, which yields the thread and reports whether to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A shared flag that stops a query when set.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn check(&self) -> Option<()> {
        if self.is_cancelled() {
            None
        } else {
            Some(())
        }
    }

    /// Suspension point: yields to the scheduler, then checks the token.
    #[inline]
    pub fn checkpoint(&self) -> Option<()> {
        thread::yield_now();
        self.check()
    }
}
