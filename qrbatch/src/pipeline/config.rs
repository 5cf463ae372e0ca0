//! Pipeline configuration.

use std::time::Duration;

/// Default number of items drawn per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default failed-attempt budget per item.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default hard deadline for a single encode call.
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Tunable knobs for generation runs.
///
/// One config is captured per run, so changing it mid-run never affects
/// batches already drawn.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Items drawn per batch. Values below 1 are clamped by
    /// [`normalized`](Self::normalized).
    pub batch_size: usize,

    /// Failed attempts an item may accumulate before it is marked Failed.
    /// An item is attempted at most `max_retries + 1` times.
    pub max_retries: u32,

    /// Whether failed items are re-queued at all. When false the first
    /// failure is terminal.
    pub retries_enabled: bool,

    /// Hard deadline for one encode call.
    pub encode_timeout: Duration,

    /// Pause between batches so systemic failure cannot hammer the
    /// encoder in a tight loop.
    pub batch_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retries_enabled: true,
            encode_timeout: DEFAULT_ENCODE_TIMEOUT,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

impl PipelineConfig {
    /// Clamp degenerate values into usable ones.
    ///
    /// A batch size of 0 would draw nothing forever, so it becomes 1.
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self
    }
}
