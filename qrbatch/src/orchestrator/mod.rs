//! Run orchestration.
//!
//! One worker task owns every piece of mutable run state: the state
//! table, the progress gauge, and the published status. Handles talk to
//! the worker over a command channel and read back through a watch
//! channel, so no caller ever contends with the run loop over a lock.
//!
//! # Architecture
//!
//! ```text
//! PipelineHandle ── commands ──▶ GenerationOrchestrator ──▶ process_batch ──▶ EncoderAdapter
//!        ▲                               │                        │
//!        └─────── watch status ◀─────────┘                   ImageCache
//! ```
//!
//! # Key Components
//!
//! - [`GenerationOrchestrator`] - Single-writer worker driving runs batch by batch
//! - [`PipelineHandle`] - Cloneable caller boundary (start, cancel, retry, snapshot)
//! - [`RunStatus`] - Published on a watch channel after every batch
//! - [`RunPhase`] - Run-level state machine (idle, running, terminal states)
//!
//! At most one run is active per orchestrator. Items submitted while a
//! run is in flight wait in a late-enqueue queue and are promoted as a
//! fresh run, with its own 0-100 progress scale, once the active run
//! completes normally. A cancelled or failed run discards the queue.

mod handle;
mod status;

pub use handle::{PipelineClosed, PipelineHandle, PipelineSnapshot};
pub use status::{RunPhase, RunStatus};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::ImageCache;
use crate::catalog::{CatalogItem, ItemId};
use crate::encoder::{EncoderAdapter, QrEncoder};
use crate::lifecycle::LifecycleGuard;
use crate::pipeline::{process_batch, PipelineConfig, ProgressGauge, RunError, RunId};
use crate::state::StateTable;

/// Mutation requests sent from handles to the worker.
enum Command {
    /// Begin a run, or defer the items if a run is already active.
    Start(Vec<CatalogItem>),
    /// Re-seed previously failed items and run them afresh.
    RetryFailed(Vec<CatalogItem>),
    /// Cancel any active run, empty the cache, reset published state.
    ClearCache,
}

/// How a run ended.
#[derive(Debug)]
enum RunEnding {
    /// Every item reached a terminal status.
    Completed,
    /// The cancellation signal stopped the run early.
    Cancelled,
    /// A fatal error halted the run.
    Failed(String),
}

/// What one run hands back to the drive loop.
struct RunOutcome {
    ending: RunEnding,
    late_queue: Vec<CatalogItem>,
    clear_requested: bool,
}

/// Single-writer worker that owns all run state.
///
/// Built together with its [`PipelineHandle`]; spawn [`run`](Self::run)
/// on the runtime and keep the handle.
pub struct GenerationOrchestrator<E: QrEncoder> {
    adapter: EncoderAdapter<E>,
    cache: Arc<ImageCache>,
    config: PipelineConfig,
    command_rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<RunStatus>,
    guard: Arc<LifecycleGuard>,
    status: RunStatus,
}

impl<E: QrEncoder> GenerationOrchestrator<E> {
    /// Build a worker and its handle with a fresh, empty image cache.
    pub fn new(encoder: Arc<E>, config: PipelineConfig) -> (Self, PipelineHandle) {
        Self::with_cache(encoder, config, Arc::new(ImageCache::new()))
    }

    /// Build a worker and its handle over an existing cache.
    pub fn with_cache(
        encoder: Arc<E>,
        config: PipelineConfig,
        cache: Arc<ImageCache>,
    ) -> (Self, PipelineHandle) {
        let config = config.normalized();
        let adapter = EncoderAdapter::new(encoder, config.encode_timeout);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RunStatus::default());
        let guard = Arc::new(LifecycleGuard::new());

        let handle = PipelineHandle::new(
            command_tx,
            status_rx,
            Arc::clone(&cache),
            Arc::clone(&guard),
        );
        let orchestrator = Self {
            adapter,
            cache,
            config,
            command_rx,
            status_tx,
            guard,
            status: RunStatus::default(),
        };

        (orchestrator, handle)
    }

    /// Drive the pipeline until `shutdown` fires or every handle is gone.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            retries_enabled = self.config.retries_enabled,
            timeout_secs = self.config.encode_timeout.as_secs(),
            "generation pipeline started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping pipeline");
                    break;
                }

                command = self.command_rx.recv() => match command {
                    None => {
                        debug!("all pipeline handles dropped, stopping pipeline");
                        break;
                    }
                    Some(Command::Start(items)) => self.drive(items, &shutdown).await,
                    Some(Command::RetryFailed(items)) => {
                        debug!(items = items.len(), "re-running failed items");
                        self.drive(items, &shutdown).await;
                    }
                    Some(Command::ClearCache) => self.reset_all(),
                },
            }
        }

        self.guard.close();
        debug!("generation pipeline stopped");
    }

    /// Run `items` to a terminal state, then promote anything queued
    /// while the run was active.
    ///
    /// Queued items become a fresh run only after a normal completion;
    /// a cancelled or failed run discards them. A cache clear lands
    /// between runs: it resets state first, and only items submitted
    /// after the clear request survive into the next run.
    async fn drive(&mut self, items: Vec<CatalogItem>, shutdown: &CancellationToken) {
        let mut next = Some(items);

        while let Some(items) = next.take() {
            let run = self.execute_run(items, shutdown).await;

            if run.clear_requested {
                self.reset_all();
                if !run.late_queue.is_empty() {
                    next = Some(run.late_queue);
                }
                continue;
            }

            match run.ending {
                RunEnding::Completed if !run.late_queue.is_empty() => {
                    info!(
                        items = run.late_queue.len(),
                        "promoting late-enqueued items as a fresh run"
                    );
                    next = Some(run.late_queue);
                }
                RunEnding::Completed => {}
                RunEnding::Cancelled | RunEnding::Failed(_) => {
                    if !run.late_queue.is_empty() {
                        debug!(
                            dropped = run.late_queue.len(),
                            "discarding queued items after interrupted run"
                        );
                    }
                }
            }
        }
    }

    /// Execute one run over `items` until every item settles, the run is
    /// cancelled, or a fatal error halts it.
    async fn execute_run(
        &mut self,
        items: Vec<CatalogItem>,
        shutdown: &CancellationToken,
    ) -> RunOutcome {
        let mut late_queue = Vec::new();
        let mut clear_requested = false;

        let Some(token) = self.guard.begin_run(shutdown) else {
            debug!("pipeline is closed, dropping run request");
            return RunOutcome {
                ending: RunEnding::Cancelled,
                late_queue,
                clear_requested,
            };
        };

        let run_id = RunId::next();
        let items_by_id: HashMap<ItemId, CatalogItem> = items
            .iter()
            .map(|item| (item.id.clone(), item.clone()))
            .collect();
        let mut table = StateTable::seed(&items);
        let mut gauge = ProgressGauge::new(table.counts().total);

        // A re-seeded id starts over, so its stale failure record goes away.
        self.status.failed.retain(|id, _| !items_by_id.contains_key(id));

        self.status.phase = RunPhase::Running;
        self.status.progress = gauge.current();
        self.status.counts = table.counts();
        self.status.last_error = None;
        self.status.runs_started += 1;
        self.publish();

        info!(run_id = %run_id, items = self.status.counts.total, "generation run started");

        let ending = loop {
            self.drain_commands(run_id, &mut late_queue, &mut clear_requested, &token);

            if token.is_cancelled() {
                break RunEnding::Cancelled;
            }
            if table.is_drained() {
                break RunEnding::Completed;
            }

            let batch = table.draw_batch(self.config.batch_size);
            let outcome = match process_batch(
                run_id,
                &batch,
                &items_by_id,
                &mut table,
                &self.cache,
                &self.adapter,
                &self.config,
                &token,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => break RunEnding::Failed(e.to_string()),
            };

            for id in &outcome.failed {
                let reason = table
                    .get(id)
                    .and_then(|state| state.last_error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                self.status.failed.insert(id.clone(), reason);
            }
            self.status.counts = table.counts();
            self.status.progress = gauge.update(self.status.counts.terminal());
            self.publish();

            if outcome.interrupted {
                break RunEnding::Cancelled;
            }

            if !table.is_drained() {
                // Mandatory pause between batches, cut short by cancellation.
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(self.config.batch_delay) => {}
                }
            }
        };

        self.status.counts = table.counts();
        self.status.runs_finished += 1;
        match &ending {
            RunEnding::Completed => {
                info!(
                    run_id = %run_id,
                    completed = self.status.counts.completed,
                    failed = self.status.counts.failed,
                    "generation run completed"
                );
                // With queued items waiting, the next run begins at once
                // and the phase stays Running until the queue is empty.
                if late_queue.is_empty() {
                    self.status.phase = RunPhase::Completed;
                    self.publish();
                }
            }
            RunEnding::Cancelled => {
                info!(
                    run_id = %run_id,
                    pending = self.status.counts.pending,
                    "generation run cancelled"
                );
                self.status.phase = RunPhase::Cancelled;
                self.publish();
            }
            RunEnding::Failed(message) => {
                error!(run_id = %run_id, error = %message, "generation run failed");
                self.status.phase = RunPhase::Failed;
                self.status.last_error = Some(message.clone());
                self.publish();
            }
        }

        RunOutcome {
            ending,
            late_queue,
            clear_requested,
        }
    }

    /// Absorb commands that arrived while a run is active, without
    /// blocking.
    ///
    /// Start and retry requests wait in the late-enqueue queue. A cache
    /// clear cancels this run's token directly: the guard token the
    /// handle fired may predate this run, so the signal is re-aimed at
    /// the live one. Items queued before the clear are superseded by it.
    fn drain_commands(
        &mut self,
        run_id: RunId,
        late_queue: &mut Vec<CatalogItem>,
        clear_requested: &mut bool,
        token: &CancellationToken,
    ) {
        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                Command::Start(items) | Command::RetryFailed(items) => {
                    let rejection = RunError::ConcurrentStartRejected {
                        queued: items.len(),
                    };
                    debug!(run_id = %run_id, %rejection, "deferring items to the next run");
                    late_queue.extend(items);
                }
                Command::ClearCache => {
                    late_queue.clear();
                    *clear_requested = true;
                    token.cancel();
                }
            }
        }
    }

    /// Empty the cache and return the published state to idle.
    ///
    /// The lifetime run counters survive so waiters anchored on them
    /// stay valid across a reset.
    fn reset_all(&mut self) {
        self.cache.clear();
        self.status = RunStatus {
            runs_started: self.status.runs_started,
            runs_finished: self.status.runs_finished,
            ..RunStatus::default()
        };
        self.publish();
        info!("cache cleared and pipeline state reset");
    }

    fn publish(&self) {
        // A send error only means no handle is listening right now.
        let _ = self.status_tx.send(self.status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::encoder::QrEncodeError;

    struct StubEncoder;

    impl QrEncoder for StubEncoder {
        fn encode(&self, payload: &str) -> Result<Vec<u8>, QrEncodeError> {
            Ok(format!("png:{payload}").into_bytes())
        }
    }

    struct FailingEncoder;

    impl QrEncoder for FailingEncoder {
        fn encode(&self, _payload: &str) -> Result<Vec<u8>, QrEncodeError> {
            Err(QrEncodeError::new("module matrix overflow"))
        }
    }

    fn item(id: &str) -> CatalogItem {
        CatalogItem::new(id, format!("https://qr.example/i/{id}"))
    }

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(1),
            ..PipelineConfig::default()
        }
    }

    async fn wait(
        handle: &mut PipelineHandle,
        predicate: impl FnMut(&RunStatus) -> bool,
    ) -> RunStatus {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
            .await
            .expect("timed out waiting for pipeline status")
            .expect("pipeline closed while waiting")
    }

    #[tokio::test]
    async fn test_run_completes_all_items() {
        let (orchestrator, mut handle) =
            GenerationOrchestrator::new(Arc::new(StubEncoder), quick_config());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

        handle
            .start(vec![item("a"), item("b"), item("c")])
            .unwrap();
        let status = wait(&mut handle, |s| s.runs_finished >= 1).await;

        assert_eq!(status.phase, RunPhase::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.counts.completed, 3);
        assert_eq!(status.counts.failed, 0);
        assert!(status.failed.is_empty());

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.images.len(), 3);
        assert!(snapshot.images.contains_key(&ItemId::new("b")));

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_start_reports_complete() {
        let (orchestrator, mut handle) =
            GenerationOrchestrator::new(Arc::new(StubEncoder), quick_config());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

        handle.start(Vec::new()).unwrap();
        let status = wait(&mut handle, |s| s.runs_finished >= 1).await;

        assert_eq!(status.phase, RunPhase::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.counts.total, 0);

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_in_failed_map() {
        let config = PipelineConfig {
            max_retries: 1,
            ..quick_config()
        };
        let (orchestrator, mut handle) =
            GenerationOrchestrator::new(Arc::new(FailingEncoder), config);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

        handle.start(vec![item("a"), item("b")]).unwrap();
        let status = wait(&mut handle, |s| s.runs_finished >= 1).await;

        assert_eq!(status.phase, RunPhase::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.counts.failed, 2);
        assert_eq!(status.failed.len(), 2);
        assert!(status.failed[&ItemId::new("a")].contains("module matrix overflow"));
        assert!(handle.snapshot().images.is_empty());

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_cache_resets_state_but_keeps_run_counters() {
        let (orchestrator, mut handle) =
            GenerationOrchestrator::new(Arc::new(StubEncoder), quick_config());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

        handle.start(vec![item("a"), item("b")]).unwrap();
        wait(&mut handle, |s| s.runs_finished >= 1).await;
        assert_eq!(handle.snapshot().images.len(), 2);

        handle.clear_cache().unwrap();
        let status = wait(&mut handle, |s| s.phase == RunPhase::Idle).await;

        assert_eq!(status.progress, 0);
        assert_eq!(status.counts.total, 0);
        assert_eq!(status.runs_started, 1);
        assert_eq!(status.runs_finished, 1);
        assert!(handle.snapshot().images.is_empty());

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_errors_after_shutdown() {
        let (orchestrator, handle) =
            GenerationOrchestrator::new(Arc::new(StubEncoder), quick_config());
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(orchestrator.run(shutdown.clone()));

        shutdown.cancel();
        worker.await.unwrap();

        assert!(handle.start(vec![item("a")]).is_err());
        assert!(handle.clear_cache().is_err());
    }
}
