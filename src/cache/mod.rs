//! Content cache for offline reads.
//!
//! This module provides an advisory key/value cache that:
//! - Expires entries lazily on read (`now >= expires_at` is a miss)
//! - Sweeps expired entries and evicts oldest-first down to 80% of capacity
//! - Spreads maintenance across writes with a probabilistic cleanup
//! - Treats every storage failure as a miss

mod content;
mod entry;

pub use content::{ContentCache, CACHE_PREFIX};
pub use entry::{CacheEntry, CacheSettings, CacheStats, CleanupReport, MAX_TTL_DAYS};
