//! Published run status.

use std::collections::HashMap;

use crate::catalog::ItemId;
use crate::state::StateCounts;

/// Phase of the run-level state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunPhase {
    /// No run has started yet, or state was reset.
    #[default]
    Idle,

    /// A run is actively drawing batches.
    Running,

    /// The most recent run drained every item.
    Completed,

    /// The most recent run was cancelled.
    Cancelled,

    /// The most recent run halted on a fatal error.
    Failed,
}

impl RunPhase {
    /// Returns true while a run is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true once a run has ended, one way or another.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Externally visible orchestrator state, published on a watch channel
/// after every batch.
///
/// `progress` and `counts` describe the current (or most recent) run.
/// `failed` is cumulative across runs and pruned when an id is re-seeded
/// into a later run. The two run counters only ever grow, surviving even
/// a cache reset, so waiters can anchor on them without races.
#[derive(Clone, Debug, Default)]
pub struct RunStatus {
    /// Run-level phase.
    pub phase: RunPhase,
    /// Monotonic percent progress of the current run.
    pub progress: u8,
    /// Item counts of the current run.
    pub counts: StateCounts,
    /// Failure reason by item id.
    pub failed: HashMap<ItemId, String>,
    /// Most recent fatal error, if any.
    pub last_error: Option<String>,
    /// Runs begun over this pipeline's lifetime.
    pub runs_started: u64,
    /// Runs ended over this pipeline's lifetime.
    pub runs_finished: u64,
}

impl RunStatus {
    /// Whether no run is currently in flight.
    pub fn is_quiescent(&self) -> bool {
        !self.phase.is_active() && self.runs_finished == self.runs_started
    }
}
