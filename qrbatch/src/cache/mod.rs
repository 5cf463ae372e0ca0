//! Result caching for generated images.
//!
//! One cache instance lives for the whole pipeline; runs consult it before
//! encoding and populate it on success, so repeated runs over overlapping
//! item sets never redo finished work.

mod image_cache;
mod stats;

pub use image_cache::ImageCache;
pub use stats::{CacheStats, CacheStatsSnapshot};
