//! Run lifecycle guard.
//!
//! Owns the cancellation signal of whichever run is active, plus the
//! pipeline's closed flag. The worker installs a fresh token per run;
//! handles fire the current one. Once closed, no further run can begin,
//! which turns post-teardown mutation attempts into refusals instead of
//! crashes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared cancellation and teardown state for one pipeline.
#[derive(Debug)]
pub struct LifecycleGuard {
    current: Mutex<CancellationToken>,
    closed: AtomicBool,
}

impl LifecycleGuard {
    /// Create an open guard with an idle token installed.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancellationToken::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Install and return a fresh token for a new run.
    ///
    /// The token is a child of `parent`, so a process-level shutdown
    /// cancels the run as well. Returns `None` once the guard is closed;
    /// a cancel aimed at an earlier run never leaks into the new token.
    pub fn begin_run(&self, parent: &CancellationToken) -> Option<CancellationToken> {
        if self.is_closed() {
            return None;
        }
        let token = parent.child_token();
        *self.current.lock().unwrap() = token.clone();
        Some(token)
    }

    /// Fire the current run's cancellation signal.
    ///
    /// Idempotent, and harmless when no run is active.
    pub fn cancel(&self) {
        self.current.lock().unwrap().cancel();
    }

    /// Whether the current run's signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.current.lock().unwrap().is_cancelled()
    }

    /// Cancel the current run and permanently close the guard.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("lifecycle guard closed");
        }
        self.cancel();
    }

    /// Whether the guard has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}
