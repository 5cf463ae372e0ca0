//! Monotonic run progress.

/// Percent progress for one run, clamped non-decreasing.
///
/// Progress is `round(100 * terminal / total)` where terminal counts both
/// completed and failed items. A recomputation never reports less than a
/// previous one; an empty run reports 100 from the start. Each run gets
/// its own gauge with its own 0-100 scale.
#[derive(Debug, Clone)]
pub struct ProgressGauge {
    total: usize,
    reported: u8,
}

impl ProgressGauge {
    /// Create a gauge for a run over `total` items.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            reported: if total == 0 { 100 } else { 0 },
        }
    }

    /// Fold in the current terminal count and return the value to report.
    pub fn update(&mut self, terminal: usize) -> u8 {
        if self.total == 0 {
            return self.reported;
        }
        let ratio = terminal.min(self.total) as f64 / self.total as f64;
        let percent = (ratio * 100.0).round() as u8;
        if percent > self.reported {
            self.reported = percent;
        }
        self.reported
    }

    /// Most recently reported value.
    pub fn current(&self) -> u8 {
        self.reported
    }
}
