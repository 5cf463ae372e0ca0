//! Run identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one generation run, for log correlation.
///
/// Ids are process-wide and never reused; a fresh one is allocated every
/// time a run begins, including late-enqueue follow-up runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    /// Allocate the next run id.
    pub fn next() -> Self {
        Self(RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let a = RunId::next();
        let b = RunId::next();

        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_display_format() {
        let id = RunId::next();
        assert_eq!(format!("{}", id), format!("run-{}", id.as_u64()));
    }
}
