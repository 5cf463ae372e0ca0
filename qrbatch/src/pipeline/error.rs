//! Run-level errors.
//!
//! Per-item encode failures are not run errors; they live in the state
//! table and surface through the failed-items map. This type covers the
//! run as a whole.

use thiserror::Error;

/// Errors at the scope of a whole run.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// A start request arrived while a run was active. The items were
    /// queued for the next run; nothing failed and the caller sees no
    /// error.
    #[error("run already active, queued {queued} item(s) for the next run")]
    ConcurrentStartRejected {
        /// How many items were appended to the late-enqueue queue.
        queued: usize,
    },

    /// An internal invariant broke. The run halts; the message surfaces
    /// through the snapshot's last_error.
    #[error("fatal run error: {0}")]
    Fatal(String),
}

impl RunError {
    /// Whether this error halts the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::Fatal(_))
    }
}
