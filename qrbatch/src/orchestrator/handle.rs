//! Caller-facing pipeline handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::cache::{CacheStatsSnapshot, ImageCache};
use crate::catalog::{CatalogItem, ItemId};
use crate::lifecycle::LifecycleGuard;

use super::status::RunStatus;
use super::Command;

/// The worker task is gone; the pipeline accepts no further commands.
#[derive(Debug, Clone, Error)]
#[error("pipeline worker has shut down")]
pub struct PipelineClosed;

/// Cloneable caller boundary for the generation pipeline.
///
/// Every mutation funnels through the worker's command channel, so a
/// handle call never races the run loop. Reads come from the published
/// status and the shared cache and are safe to poll at any time.
#[derive(Clone)]
pub struct PipelineHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<RunStatus>,
    cache: Arc<ImageCache>,
    guard: Arc<LifecycleGuard>,
}

impl PipelineHandle {
    pub(super) fn new(
        command_tx: mpsc::UnboundedSender<Command>,
        status_rx: watch::Receiver<RunStatus>,
        cache: Arc<ImageCache>,
        guard: Arc<LifecycleGuard>,
    ) -> Self {
        Self {
            command_tx,
            status_rx,
            cache,
            guard,
        }
    }

    /// Begin a run over `items`.
    ///
    /// If a run is already active the items are queued and processed as a
    /// fresh run once the active one completes; at most one run is ever
    /// in flight.
    pub fn start(&self, items: Vec<CatalogItem>) -> Result<(), PipelineClosed> {
        self.send(Command::Start(items))
    }

    /// Fire the active run's cancellation signal.
    ///
    /// Idempotent and non-blocking. The signal lands mid-encode rather
    /// than at the next batch boundary; a no-op when nothing is running.
    pub fn cancel(&self) {
        self.guard.cancel();
    }

    /// Reset the named failed items and process them as a fresh run.
    ///
    /// Seeding zeroes their retry counts and removes them from the failed
    /// map.
    pub fn retry_failed(&self, items: Vec<CatalogItem>) -> Result<(), PipelineClosed> {
        self.send(Command::RetryFailed(items))
    }

    /// Cancel any active run, empty the image cache, and reset the
    /// published state to idle.
    pub fn clear_cache(&self) -> Result<(), PipelineClosed> {
        // Cancel first so an in-flight batch unwinds promptly; the worker
        // performs the clear once the run has exited.
        self.guard.cancel();
        self.send(Command::ClearCache)
    }

    /// Cheap read of the most recently published status.
    pub fn status(&self) -> RunStatus {
        self.status_rx.borrow().clone()
    }

    /// Assemble the full caller-facing snapshot.
    ///
    /// Images come from the shared cache, everything else from the
    /// published status. The two reads are taken back to back, so a
    /// snapshot may momentarily show an image for an item the status has
    /// not yet counted; it never shows the reverse.
    pub fn snapshot(&self) -> PipelineSnapshot {
        let status = self.status();
        PipelineSnapshot {
            images: self.cache.image_map(),
            status,
        }
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    /// Wait for a status publication newer than the last one seen by
    /// this handle.
    ///
    /// # Errors
    ///
    /// [`PipelineClosed`] if the worker shuts down first.
    pub async fn changed(&mut self) -> Result<(), PipelineClosed> {
        self.status_rx.changed().await.map_err(|_| PipelineClosed)
    }

    /// Wait until the published status satisfies `predicate`, returning
    /// the first status that does.
    ///
    /// # Errors
    ///
    /// [`PipelineClosed`] if the worker shuts down before the predicate
    /// is satisfied.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Result<RunStatus, PipelineClosed>
    where
        F: FnMut(&RunStatus) -> bool,
    {
        match self.status_rx.wait_for(predicate).await {
            Ok(status) => Ok(status.clone()),
            Err(_) => Err(PipelineClosed),
        }
    }

    /// Wait until no run is in flight and return the settled status.
    ///
    /// Note that a command sent moments ago may not have begun its run
    /// yet; waiters that need a specific run to finish should anchor on
    /// `runs_finished` via [`wait_for`](Self::wait_for).
    pub async fn wait_quiescent(&mut self) -> Result<RunStatus, PipelineClosed> {
        self.wait_for(|status| status.is_quiescent()).await
    }

    fn send(&self, command: Command) -> Result<(), PipelineClosed> {
        self.command_tx.send(command).map_err(|_| PipelineClosed)
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("status", &self.status())
            .field("cached_images", &self.cache.len())
            .finish()
    }
}

/// Read-only view of the pipeline: generated images plus run state.
#[derive(Clone, Debug)]
pub struct PipelineSnapshot {
    /// Generated images by item id.
    pub images: HashMap<ItemId, Bytes>,
    /// Published run status at snapshot time.
    pub status: RunStatus,
}

impl PipelineSnapshot {
    /// Ids of items whose retries are exhausted.
    pub fn failed_ids(&self) -> HashSet<ItemId> {
        self.status.failed.keys().cloned().collect()
    }

    /// Percent progress of the current or most recent run.
    pub fn progress(&self) -> u8 {
        self.status.progress
    }

    /// Most recent fatal error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.status.last_error.as_deref()
    }
}
