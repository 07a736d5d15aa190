//! Cache entry record and cache settings.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CACHE_CAPACITY, CLEANUP_PROBABILITY, DEFAULT_TTL_SECS};

/// Longest entry lifetime, about a thousand years. Keeps `expires_at` within
/// four-digit years for any realistic `now`.
pub const MAX_TTL_DAYS: i64 = 365 * 1000;

/// A value stored in the content cache together with its lifetime.
///
/// `expires_at` is always strictly after `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub value: T,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  /// Build an entry created at `now` that lives for `ttl`.
  ///
  /// `ttl` is clamped to between one millisecond and [`MAX_TTL_DAYS`].
  pub fn new(value: T, now: DateTime<Utc>, ttl: Duration) -> Self {
    let ttl = ttl.clamp(Duration::milliseconds(1), Duration::days(MAX_TTL_DAYS));
    Self {
      value,
      created_at: now,
      expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
  }

  /// An entry is live strictly before its expiry instant.
  pub fn is_live(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at
  }
}

/// Tunables for [`ContentCache`](super::ContentCache).
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Upper bound on total stored bytes before eviction kicks in
  pub capacity_bytes: u64,
  /// TTL used by `put_default`
  pub default_ttl: Duration,
  /// Chance that a `put` also runs `cleanup` (0.0 disables)
  pub cleanup_probability: f64,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      capacity_bytes: CACHE_CAPACITY,
      default_ttl: Duration::seconds(DEFAULT_TTL_SECS as i64),
      cleanup_probability: CLEANUP_PROBABILITY,
    }
  }
}

/// What a `cleanup` pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
  /// Entries removed because they had expired
  pub expired: usize,
  /// Live entries removed to get back under capacity
  pub evicted: usize,
  /// Records that could not be decoded and were purged
  pub corrupt: usize,
  /// Total bytes still stored after the pass
  pub remaining_bytes: u64,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub entries: usize,
  pub expired: usize,
  pub total_bytes: u64,
}
