//! Batch QR generation pipeline.
//!
//! The pipeline turns a list of catalog items into cached images, one
//! bounded batch at a time:
//!
//! ```text
//! start(items) → StateTable seed → draw batch → process_batch
//!                      ↑                             │
//!                      └── retry re-queue ←──────────┘
//!                              (cache populated per item)
//! ```
//!
//! # Key components
//!
//! - [`PipelineConfig`] - batch size, retry budget, timeouts
//! - [`process_batch`] - drives one drawn batch to terminal statuses
//! - [`ProgressGauge`] - monotonic percent progress per run
//! - [`RunId`] - log-correlation identity for a run
//! - [`RunError`] - run-scoped failures, distinct from per-item errors
//!
//! The run loop that draws batches lives in [`crate::orchestrator`]; the
//! per-item status machine lives in [`crate::state`].

mod batch;
mod config;
mod error;
mod progress;
mod run;

pub use batch::{process_batch, BatchOutcome};
pub use config::{
    PipelineConfig, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_ENCODE_TIMEOUT,
    DEFAULT_MAX_RETRIES,
};
pub use error::RunError;
pub use progress::ProgressGauge;
pub use run::RunId;
