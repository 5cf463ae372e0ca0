//! Per-item generation state tracking.
//!
//! One [`StateTable`] exists per run and is owned by value inside the run
//! loop. That single-writer discipline is what makes the table safe
//! without locks; everything outside the pipeline sees only cloned
//! snapshots.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tracing::warn;

use crate::catalog::{CatalogItem, ItemId};

/// Generation status of a single item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GenerationStatus {
    /// Waiting to be drawn into a batch.
    #[default]
    Pending,

    /// An encode call is in flight for this item.
    Generating,

    /// The image was produced and stored in the cache.
    Completed,

    /// Retries are exhausted (or disabled); the item will not be
    /// re-attempted within this run.
    Failed,
}

impl GenerationStatus {
    /// Returns true if no further transitions occur for this item.
    ///
    /// Terminal states are: Completed, Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Generating => write!(f, "Generating"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Tracked state of a single item within a run.
#[derive(Clone, Debug, Default)]
pub struct GenerationState {
    /// Current status.
    pub status: GenerationStatus,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Most recent error detail, if any attempt failed.
    pub last_error: Option<String>,
    /// When the most recent encode attempt started.
    pub started_at: Option<Instant>,
    /// When the item reached a terminal status.
    pub finished_at: Option<Instant>,
}

/// Counts of items by status, derived from the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub generating: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl StateCounts {
    /// Items that reached a terminal status.
    pub fn terminal(&self) -> usize {
        self.completed + self.failed
    }
}

/// Per-item status machine plus the FIFO draw queue for one run.
#[derive(Debug, Default)]
pub struct StateTable {
    states: HashMap<ItemId, GenerationState>,
    pending: VecDeque<ItemId>,
}

impl StateTable {
    /// Build a table with every item Pending and a zero retry count.
    ///
    /// Duplicate ids keep their first occurrence; later duplicates are
    /// dropped with a warning so one id can never be drawn twice.
    pub fn seed(items: &[CatalogItem]) -> Self {
        let mut table = Self {
            states: HashMap::with_capacity(items.len()),
            pending: VecDeque::with_capacity(items.len()),
        };

        for item in items {
            if table.states.contains_key(&item.id) {
                warn!(item_id = %item.id, "duplicate item id in seed, ignoring");
                continue;
            }
            table.states.insert(item.id.clone(), GenerationState::default());
            table.pending.push_back(item.id.clone());
        }

        table
    }

    /// Pop up to `n` ids from the front of the pending queue.
    pub fn draw_batch(&mut self, n: usize) -> Vec<ItemId> {
        let count = n.min(self.pending.len());
        self.pending.drain(..count).collect()
    }

    /// Transition an item to Generating and stamp its start time.
    pub fn mark_generating(&mut self, id: &ItemId) {
        self.transition(id, |state| {
            state.status = GenerationStatus::Generating;
            state.started_at = Some(Instant::now());
        });
    }

    /// Transition an item to Completed.
    pub fn mark_completed(&mut self, id: &ItemId) {
        self.transition(id, |state| {
            state.status = GenerationStatus::Completed;
            state.finished_at = Some(Instant::now());
        });
    }

    /// Transition an item to Failed with the terminal error detail.
    pub fn mark_failed(&mut self, id: &ItemId, reason: &str) {
        self.transition(id, |state| {
            state.status = GenerationStatus::Failed;
            state.last_error = Some(reason.to_string());
            state.finished_at = Some(Instant::now());
        });
    }

    /// Count a failed attempt and put the item back at the BACK of the
    /// pending queue for a later batch.
    pub fn requeue_for_retry(&mut self, id: &ItemId, reason: &str) {
        let mut requeued = false;
        self.transition(id, |state| {
            state.status = GenerationStatus::Pending;
            state.retry_count += 1;
            state.last_error = Some(reason.to_string());
            requeued = true;
        });
        if requeued {
            self.pending.push_back(id.clone());
        }
    }

    /// Return interrupted items to the FRONT of the pending queue in their
    /// original relative order, resetting any Generating status.
    ///
    /// Used when cancellation cuts a batch short: the untouched remainder
    /// stays Pending and keeps its position.
    pub fn restore_pending(&mut self, ids: &[ItemId]) {
        for id in ids.iter().rev() {
            let mut restored = false;
            self.transition(id, |state| {
                state.status = GenerationStatus::Pending;
                restored = true;
            });
            if restored {
                self.pending.push_front(id.clone());
            }
        }
    }

    /// Look up one item's state.
    pub fn get(&self, id: &ItemId) -> Option<&GenerationState> {
        self.states.get(id)
    }

    /// Whether the pending queue is empty.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of items waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Count items by status.
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts {
            total: self.states.len(),
            ..Default::default()
        };
        for state in self.states.values() {
            match state.status {
                GenerationStatus::Pending => counts.pending += 1,
                GenerationStatus::Generating => counts.generating += 1,
                GenerationStatus::Completed => counts.completed += 1,
                GenerationStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Immutable copy of every item's state.
    pub fn snapshot(&self) -> HashMap<ItemId, GenerationState> {
        self.states.clone()
    }

    /// Apply `mutate` to the item's state unless it is already terminal.
    ///
    /// Transitions out of a terminal status are refused with a warning;
    /// unknown ids are refused the same way. Neither is a panic.
    fn transition<F: FnOnce(&mut GenerationState)>(&mut self, id: &ItemId, mutate: F) {
        match self.states.get_mut(id) {
            Some(state) if state.status.is_terminal() => {
                warn!(
                    item_id = %id,
                    status = %state.status,
                    "ignoring transition for item in terminal status"
                );
            }
            Some(state) => mutate(state),
            None => {
                warn!(item_id = %id, "ignoring transition for unknown item");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(ids: &[&str]) -> Vec<CatalogItem> {
        ids.iter()
            .map(|id| CatalogItem::new(*id, format!("payload-{}", id)))
            .collect()
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(!GenerationStatus::Pending.is_terminal());
        assert!(!GenerationStatus::Generating.is_terminal());
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_seed_initializes_pending() {
        let table = StateTable::seed(&items(&["a", "b", "c"]));

        let counts = table.counts();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.terminal(), 0);

        let state = table.get(&ItemId::new("a")).unwrap();
        assert_eq!(state.status, GenerationStatus::Pending);
        assert_eq!(state.retry_count, 0);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_seed_ignores_duplicate_ids() {
        let table = StateTable::seed(&items(&["a", "b", "a"]));

        assert_eq!(table.counts().total, 2);
        assert_eq!(table.pending_len(), 2);
    }

    #[test]
    fn test_draw_batch_fifo_order() {
        let mut table = StateTable::seed(&items(&["a", "b", "c", "d", "e"]));

        let first = table.draw_batch(2);
        let second = table.draw_batch(2);

        assert_eq!(first, vec![ItemId::new("a"), ItemId::new("b")]);
        assert_eq!(second, vec![ItemId::new("c"), ItemId::new("d")]);
        assert_eq!(table.pending_len(), 1);
    }

    #[test]
    fn test_draw_batch_caps_at_pending_len() {
        let mut table = StateTable::seed(&items(&["a", "b"]));

        let batch = table.draw_batch(10);

        assert_eq!(batch.len(), 2);
        assert!(table.is_drained());
        assert!(table.draw_batch(10).is_empty());
    }

    #[test]
    fn test_completion_flow_records_timestamps() {
        let mut table = StateTable::seed(&items(&["a"]));
        let id = ItemId::new("a");

        table.mark_generating(&id);
        assert_eq!(table.get(&id).unwrap().status, GenerationStatus::Generating);
        assert!(table.get(&id).unwrap().started_at.is_some());

        table.mark_completed(&id);
        let state = table.get(&id).unwrap();
        assert_eq!(state.status, GenerationStatus::Completed);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_requeue_for_retry_joins_back_of_queue() {
        let mut table = StateTable::seed(&items(&["a", "b", "c"]));

        let batch = table.draw_batch(1);
        assert_eq!(batch, vec![ItemId::new("a")]);
        table.mark_generating(&ItemId::new("a"));
        table.requeue_for_retry(&ItemId::new("a"), "encoder failure");

        // Retried items lose their original position.
        let rest: Vec<ItemId> = table.draw_batch(3);
        assert_eq!(
            rest,
            vec![ItemId::new("b"), ItemId::new("c"), ItemId::new("a")]
        );

        let state = table.get(&ItemId::new("a")).unwrap();
        assert_eq!(state.status, GenerationStatus::Pending);
        assert_eq!(state.retry_count, 1);
        assert_eq!(state.last_error.as_deref(), Some("encoder failure"));
    }

    #[test]
    fn test_restore_pending_preserves_front_order() {
        let mut table = StateTable::seed(&items(&["a", "b", "c", "d"]));

        let batch = table.draw_batch(3);
        assert_eq!(batch.len(), 3);
        table.mark_generating(&ItemId::new("a"));

        // Interrupted mid-batch: a was in flight, b and c untouched.
        table.restore_pending(&[ItemId::new("a"), ItemId::new("b"), ItemId::new("c")]);

        let redraw = table.draw_batch(4);
        assert_eq!(
            redraw,
            vec![
                ItemId::new("a"),
                ItemId::new("b"),
                ItemId::new("c"),
                ItemId::new("d")
            ]
        );
        assert_eq!(
            table.get(&ItemId::new("a")).unwrap().status,
            GenerationStatus::Pending
        );
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut table = StateTable::seed(&items(&["a"]));
        let id = ItemId::new("a");

        table.mark_generating(&id);
        table.mark_completed(&id);

        // None of these may move the item out of Completed.
        table.mark_generating(&id);
        table.mark_failed(&id, "late failure");
        table.requeue_for_retry(&id, "late retry");

        let state = table.get(&id).unwrap();
        assert_eq!(state.status, GenerationStatus::Completed);
        assert_eq!(state.retry_count, 0);
        assert!(state.last_error.is_none());
        assert!(table.is_drained(), "sticky terminal must not requeue");
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut table = StateTable::seed(&items(&["a"]));

        table.mark_completed(&ItemId::new("ghost"));
        table.requeue_for_retry(&ItemId::new("ghost"), "nope");

        assert_eq!(table.counts().total, 1);
        assert_eq!(table.pending_len(), 1);
    }

    #[test]
    fn test_counts_across_statuses() {
        let mut table = StateTable::seed(&items(&["a", "b", "c", "d"]));

        let batch = table.draw_batch(3);
        table.mark_generating(&batch[0]);
        table.mark_completed(&batch[0]);
        table.mark_generating(&batch[1]);
        table.mark_failed(&batch[1], "boom");
        table.mark_generating(&batch[2]);

        let counts = table.counts();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.generating, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.terminal(), 2);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut table = StateTable::seed(&items(&["a"]));
        let snapshot = table.snapshot();

        table.mark_generating(&ItemId::new("a"));
        table.mark_completed(&ItemId::new("a"));

        assert_eq!(
            snapshot[&ItemId::new("a")].status,
            GenerationStatus::Pending
        );
    }
}
