//! Batch processing: drives a bounded slice of pending items to a
//! terminal status, one item at a time.
//!
//! Items inside a batch run sequentially, in drawn order. That keeps the
//! state table single-writer and failure attribution per-item; throughput
//! scaling belongs to a partitioned worker pool, not to fan-out here.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ImageCache;
use crate::catalog::{CatalogItem, ItemId};
use crate::encoder::{EncodeError, EncoderAdapter, QrEncoder};
use crate::state::StateTable;

use super::config::PipelineConfig;
use super::error::RunError;
use super::run::RunId;

/// What happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items that reached Completed.
    pub completed: Vec<ItemId>,
    /// Items that reached Failed.
    pub failed: Vec<ItemId>,
    /// Items re-queued for a later batch.
    pub retried: Vec<ItemId>,
    /// True if cancellation cut the batch short.
    pub interrupted: bool,
}

/// Process one drawn batch.
///
/// Per item: check cancellation, transition to Generating, resolve the
/// image through the cache, then settle the item. A failed attempt is
/// re-queued while the item has retry budget left, otherwise the item is
/// Failed. Cancellation reverts the in-flight item and the untouched
/// remainder to Pending and returns early with `interrupted` set.
///
/// # Errors
///
/// [`RunError::Fatal`] if a drawn id has no payload or no table entry;
/// the unprocessed remainder is restored to Pending first.
pub async fn process_batch<E: QrEncoder>(
    run_id: RunId,
    batch: &[ItemId],
    items: &HashMap<ItemId, CatalogItem>,
    table: &mut StateTable,
    cache: &ImageCache,
    adapter: &EncoderAdapter<E>,
    config: &PipelineConfig,
    token: &CancellationToken,
) -> Result<BatchOutcome, RunError> {
    let mut outcome = BatchOutcome::default();

    for (pos, id) in batch.iter().enumerate() {
        if token.is_cancelled() {
            table.restore_pending(&batch[pos..]);
            outcome.interrupted = true;
            debug!(
                run_id = %run_id,
                restored = batch.len() - pos,
                "batch interrupted before item"
            );
            return Ok(outcome);
        }

        let item = match items.get(id) {
            Some(item) => item,
            None => {
                table.restore_pending(&batch[pos..]);
                return Err(RunError::Fatal(format!("no payload for drawn item {}", id)));
            }
        };
        if table.get(id).is_none() {
            table.restore_pending(&batch[pos..]);
            return Err(RunError::Fatal(format!("no state entry for drawn item {}", id)));
        }

        table.mark_generating(id);

        match cache.get_or_generate(item, adapter, token).await {
            Ok(image) => {
                table.mark_completed(id);
                outcome.completed.push(id.clone());
                debug!(
                    run_id = %run_id,
                    item_id = %id,
                    size_bytes = image.len(),
                    "item completed"
                );
            }
            Err(EncodeError::Cancelled) => {
                // An interruption, not a failure: the in-flight item and
                // the untouched remainder go back to Pending.
                table.restore_pending(&batch[pos..]);
                outcome.interrupted = true;
                debug!(run_id = %run_id, item_id = %id, "batch interrupted mid-item");
                return Ok(outcome);
            }
            Err(e) => {
                let retry_count = table.get(id).map(|s| s.retry_count).unwrap_or(0);
                if config.retries_enabled && retry_count < config.max_retries {
                    table.requeue_for_retry(id, &e.to_string());
                    outcome.retried.push(id.clone());
                    debug!(
                        run_id = %run_id,
                        item_id = %id,
                        attempt = retry_count + 1,
                        error = %e,
                        "item re-queued for retry"
                    );
                } else {
                    table.mark_failed(id, &e.to_string());
                    outcome.failed.push(id.clone());
                    warn!(
                        run_id = %run_id,
                        item_id = %id,
                        retry_count,
                        error = %e,
                        "item failed, retries exhausted"
                    );
                }
            }
        }
    }

    Ok(outcome)
}
