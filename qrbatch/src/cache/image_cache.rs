//! In-memory result cache for generated QR images.
//!
//! The cache is the single source of truth for "already generated". It is
//! shared between the pipeline (the only writer during a run) and callers,
//! who may read concurrently at any time.

use std::collections::HashMap;
use std::mem;
use std::sync::RwLock;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::catalog::{CatalogItem, ItemId};
use crate::encoder::{EncodeError, EncoderAdapter, QrEncoder};

use super::stats::{CacheStats, CacheStatsSnapshot};

/// Memoizes encoded images by item id.
///
/// Entries are write-once per id per run; only [`ImageCache::clear`]
/// removes them, and it does so by swapping in a fresh map so concurrent
/// readers never observe a half-cleared view.
#[derive(Debug, Default)]
pub struct ImageCache {
    images: RwLock<HashMap<ItemId, Bytes>>,
    stats: CacheStats,
}

impl ImageCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup.
    pub fn get(&self, id: &ItemId) -> Option<Bytes> {
        let images = self.images.read().unwrap();
        match images.get(id) {
            Some(image) => {
                self.stats.record_hit();
                Some(image.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Return the cached image for `item`, encoding it first if absent.
    ///
    /// On encode success the image is stored before returning. On failure
    /// nothing is stored, so a later retry re-attempts the encode rather
    /// than replaying a cached error.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's [`EncodeError`] unchanged.
    pub async fn get_or_generate<E: QrEncoder>(
        &self,
        item: &CatalogItem,
        adapter: &EncoderAdapter<E>,
        token: &CancellationToken,
    ) -> Result<Bytes, EncodeError> {
        if let Some(image) = self.get(&item.id) {
            trace!(item_id = %item.id, "cache hit, skipping encode");
            return Ok(image);
        }

        match adapter.encode_with_timeout(&item.payload, token).await {
            Ok(image) => {
                self.stats.record_encode();
                self.insert(item.id.clone(), image.clone());
                Ok(image)
            }
            Err(EncodeError::Cancelled) => Err(EncodeError::Cancelled),
            Err(e) => {
                self.stats.record_encode_failure();
                Err(e)
            }
        }
    }

    /// Empty the cache in one motion.
    ///
    /// The old map is swapped out under the write lock and dropped after
    /// releasing it; readers see either the previous complete map or the
    /// new empty one. Statistics are reset alongside.
    pub fn clear(&self) {
        let old = {
            let mut images = self.images.write().unwrap();
            mem::take(&mut *images)
        };
        self.stats.reset();
        debug!(dropped_entries = old.len(), "image cache cleared");
    }

    /// Whether an image is cached for `id`. Does not touch statistics.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.images.read().unwrap().contains_key(id)
    }

    /// Number of cached images.
    pub fn len(&self) -> usize {
        self.images.read().unwrap().len()
    }

    /// Whether the cache holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.read().unwrap().is_empty()
    }

    /// Point-in-time copy of the whole map for snapshots.
    ///
    /// Image bytes are reference-counted, so this clones handles, not
    /// pixel data.
    pub fn image_map(&self) -> HashMap<ItemId, Bytes> {
        self.images.read().unwrap().clone()
    }

    /// Current statistics counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    fn insert(&self, id: ItemId, image: Bytes) {
        let mut images = self.images.write().unwrap();
        if images.insert(id.clone(), image).is_some() {
            // Write-once per id per run; a second write means the caller
            // re-seeded an id that was never cleared.
            debug!(item_id = %id, "cache entry overwritten");
        }
    }
}
