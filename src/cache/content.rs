//! TTL-based, capacity-bounded content cache built on [`Storage`].

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheSettings, CacheStats, CleanupReport};
use crate::clock::{Clock, SystemClock};
use crate::storage::Storage;

/// Namespace for every key written by the cache.
pub const CACHE_PREFIX: &str = "cache:";

/// Fraction of capacity that eviction shrinks the cache down to.
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Advisory cache for previously fetched data.
///
/// The cache is never a source of truth: storage failures and corrupt records
/// are logged and surface to callers only as misses.
pub struct ContentCache<S: Storage> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  settings: CacheSettings,
}

impl<S: Storage> ContentCache<S> {
  /// Create a cache over `storage` with default settings.
  pub fn new(storage: Arc<S>) -> Self {
    Self {
      storage,
      clock: Arc::new(SystemClock),
      settings: CacheSettings::default(),
    }
  }

  /// Replace the cache settings.
  pub fn with_settings(mut self, settings: CacheSettings) -> Self {
    self.settings = settings;
    self
  }

  /// Replace the clock used for entry timestamps.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  /// Store `value` under `key` for `ttl`.
  ///
  /// Occasionally also runs [`cleanup`](Self::cleanup) so maintenance cost is
  /// spread across writes.
  pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
    let entry = CacheEntry::new(value, self.clock.now(), ttl);

    match serde_json::to_string(&entry) {
      Ok(raw) => {
        if let Err(e) = self.storage.set(&storage_key(key), &raw).await {
          warn!(key, error = %e, "cache write failed");
        }
      }
      Err(e) => warn!(key, error = %e, "failed to serialize cache entry"),
    }

    if self.should_sweep() {
      debug!("running opportunistic cache cleanup");
      self.cleanup().await;
    }
  }

  /// Store `value` under `key` with the default TTL.
  pub async fn put_default<T: Serialize>(&self, key: &str, value: &T) {
    self.put(key, value, self.settings.default_ttl).await
  }

  /// Look up `key`.
  ///
  /// Expired and undecodable entries are deleted and reported as a miss. A
  /// well-formed entry whose value is not a `T` is a miss but stays stored.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let storage_key = storage_key(key);
    let raw = match self.storage.get(&storage_key).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "purging undecodable cache entry");
        self.delete(&storage_key).await;
        return None;
      }
    };

    if !entry.is_live(self.clock.now()) {
      debug!(key, "cache entry expired");
      self.delete(&storage_key).await;
      return None;
    }

    match serde_json::from_value(entry.value) {
      Ok(value) => Some(value),
      Err(e) => {
        debug!(key, error = %e, "cached value has a different shape");
        None
      }
    }
  }

  /// Remove a single key.
  pub async fn remove(&self, key: &str) {
    self.delete(&storage_key(key)).await;
  }

  /// Remove every cache entry. Other namespaces are left untouched.
  pub async fn clear(&self) {
    for key in self.list().await {
      self.delete(&key).await;
    }
  }

  /// Two-phase maintenance pass.
  ///
  /// Expired entries are removed first. If what remains is still over
  /// capacity, entries are evicted oldest `created_at` first until the total
  /// is at or below 80% of capacity. Eviction stops at the first entry that
  /// cannot be removed.
  pub async fn cleanup(&self) -> CleanupReport {
    let now = self.clock.now();
    let mut report = CleanupReport::default();
    let mut survivors: Vec<Resident> = Vec::new();

    for key in self.list().await {
      match self.inspect(&key).await {
        Inspected::Missing => {}
        Inspected::Corrupt => {
          self.delete(&key).await;
          report.corrupt += 1;
        }
        Inspected::Found(resident) if resident.expires_at <= now => {
          self.delete(&resident.key).await;
          report.expired += 1;
        }
        Inspected::Found(resident) => survivors.push(resident),
      }
    }

    let mut total: u64 = survivors.iter().map(|r| r.size).sum();

    if total > self.settings.capacity_bytes {
      let target = (self.settings.capacity_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
      survivors.sort_by_key(|r| r.created_at);

      for resident in &survivors {
        if total <= target {
          break;
        }
        match self.storage.remove(&resident.key).await {
          Ok(()) => {
            total -= resident.size;
            report.evicted += 1;
          }
          Err(e) => {
            // Eviction stays oldest-first: never past an entry that could not go.
            warn!(key = %resident.key, error = %e, "cache eviction failed, stopping pass");
            break;
          }
        }
      }
    }

    report.remaining_bytes = total;
    if report.expired + report.evicted + report.corrupt > 0 {
      debug!(?report, "cache cleanup finished");
    }
    report
  }

  /// Count entries and bytes without modifying anything.
  pub async fn stats(&self) -> CacheStats {
    let now = self.clock.now();
    let mut stats = CacheStats::default();

    for key in self.list().await {
      if let Inspected::Found(resident) = self.inspect(&key).await {
        stats.entries += 1;
        stats.total_bytes += resident.size;
        if resident.expires_at <= now {
          stats.expired += 1;
        }
      }
    }

    stats
  }

  fn should_sweep(&self) -> bool {
    let p = self.settings.cleanup_probability;
    p > 0.0 && rand::rng().random_bool(p.min(1.0))
  }

  async fn list(&self) -> Vec<String> {
    match self.storage.list_keys(CACHE_PREFIX).await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(error = %e, "failed to list cache keys");
        Vec::new()
      }
    }
  }

  /// Read a record's metadata and size without decoding its value.
  async fn inspect(&self, key: &str) -> Inspected {
    let raw = match self.storage.get(key).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return Inspected::Missing,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return Inspected::Missing;
      }
    };

    match serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw) {
      Ok(entry) => Inspected::Found(Resident {
        key: key.to_string(),
        created_at: entry.created_at,
        expires_at: entry.expires_at,
        size: raw.len() as u64,
      }),
      Err(_) => Inspected::Corrupt,
    }
  }

  async fn delete(&self, storage_key: &str) {
    if let Err(e) = self.storage.remove(storage_key).await {
      warn!(key = storage_key, error = %e, "cache delete failed");
    }
  }
}

struct Resident {
  key: String,
  created_at: DateTime<Utc>,
  expires_at: DateTime<Utc>,
  size: u64,
}

enum Inspected {
  Missing,
  Corrupt,
  Found(Resident),
}

fn storage_key(key: &str) -> String {
  format!("{}{}", CACHE_PREFIX, key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::storage::{MemoryStorage, StorageError};

  fn cache_with_clock(
    settings: CacheSettings,
  ) -> (ContentCache<MemoryStorage>, Arc<MemoryStorage>, Arc<ManualClock>) {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::default());
    let cache = ContentCache::new(Arc::clone(&storage))
      .with_settings(settings)
      .with_clock(clock.clone());
    (cache, storage, clock)
  }

  fn quiet_settings() -> CacheSettings {
    CacheSettings {
      cleanup_probability: 0.0,
      ..CacheSettings::default()
    }
  }

  #[tokio::test]
  async fn put_then_get_returns_value() {
    let (cache, _, _) = cache_with_clock(quiet_settings());

    cache.put("user", &vec![1, 2, 3], Duration::seconds(1)).await;
    assert_eq!(cache.get::<Vec<i32>>("user").await, Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn expired_read_is_a_miss_and_deletes() {
    let (cache, storage, clock) = cache_with_clock(quiet_settings());

    cache.put("k", &"v", Duration::milliseconds(100)).await;
    clock.advance(Duration::milliseconds(100));

    assert_eq!(cache.get::<String>("k").await, None);
    assert!(storage.list_keys(CACHE_PREFIX).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn undecodable_entry_is_purged() {
    let (cache, storage, _) = cache_with_clock(quiet_settings());
    storage.set("cache:bad", "{not json").await.unwrap();

    assert_eq!(cache.get::<String>("bad").await, None);
    assert_eq!(storage.get("cache:bad").await.unwrap(), None);
  }

  #[tokio::test]
  async fn wrong_type_is_a_miss_without_purging() {
    let (cache, storage, _) = cache_with_clock(quiet_settings());
    cache.put("n", &42, Duration::hours(1)).await;

    assert_eq!(cache.get::<Vec<String>>("n").await, None);
    assert!(storage.get("cache:n").await.unwrap().is_some());
    assert_eq!(cache.get::<i32>("n").await, Some(42));
  }

  #[tokio::test]
  async fn put_with_maximum_ttl_does_not_panic() {
    let (cache, _, _) = cache_with_clock(quiet_settings());
    cache.put("forever", &1, Duration::MAX).await;

    assert_eq!(cache.get::<i32>("forever").await, Some(1));
  }

  #[tokio::test]
  async fn clear_leaves_other_namespaces() {
    let (cache, storage, _) = cache_with_clock(quiet_settings());
    storage.set("queue:pending", "[]").await.unwrap();
    cache.put("a", &1, Duration::hours(1)).await;
    cache.put("b", &2, Duration::hours(1)).await;

    cache.clear().await;

    assert_eq!(cache.get::<i32>("a").await, None);
    assert_eq!(cache.get::<i32>("b").await, None);
    assert!(storage.get("queue:pending").await.unwrap().is_some());
  }

  #[tokio::test]
  async fn storage_failures_are_absorbed() {
    let (cache, storage, _) = cache_with_clock(quiet_settings());
    cache.put("k", &1, Duration::hours(1)).await;

    storage.set_failing(true);
    cache.put("k2", &2, Duration::hours(1)).await;
    assert_eq!(cache.get::<i32>("k").await, None);
    cache.remove("k").await;
    cache.clear().await;
    assert_eq!(cache.cleanup().await, CleanupReport::default());

    storage.set_failing(false);
    assert_eq!(cache.get::<i32>("k").await, Some(1));
  }

  #[tokio::test]
  async fn cleanup_sweeps_expired_entries() {
    let (cache, _, clock) = cache_with_clock(quiet_settings());
    cache.put("short", &1, Duration::seconds(1)).await;
    cache.put("long", &2, Duration::hours(1)).await;

    clock.advance(Duration::seconds(1));
    let report = cache.cleanup().await;

    assert_eq!(report.expired, 1);
    assert_eq!(report.evicted, 0);
    assert_eq!(cache.get::<i32>("long").await, Some(2));
  }

  #[tokio::test]
  async fn eviction_removes_oldest_down_to_target() {
    let (_, storage, clock) = cache_with_clock(quiet_settings());
    let record_size = serde_json::to_string(&CacheEntry::new(
      "x".repeat(100),
      clock.now(),
      Duration::hours(1),
    ))
    .unwrap()
    .len() as u64;

    // Room for five records; ten get written.
    let capacity = record_size * 5;
    let cache = ContentCache::new(Arc::clone(&storage))
      .with_settings(CacheSettings {
        capacity_bytes: capacity,
        cleanup_probability: 0.0,
        ..CacheSettings::default()
      })
      .with_clock(clock.clone());

    for i in 0..10 {
      cache.put(&format!("k{}", i), &"x".repeat(100), Duration::hours(1)).await;
      clock.advance(Duration::seconds(1));
    }

    let report = cache.cleanup().await;
    assert!(report.remaining_bytes * 10 <= capacity * 8);
    assert!(report.evicted >= 6);

    for i in 0..report.evicted {
      assert_eq!(cache.get::<String>(&format!("k{}", i)).await, None);
    }
    for i in report.evicted..10 {
      assert!(cache.get::<String>(&format!("k{}", i)).await.is_some());
    }
  }

  /// Memory storage whose `remove` always fails for one key.
  struct StuckKeyStorage {
    inner: MemoryStorage,
    stuck: String,
  }

  #[async_trait::async_trait]
  impl Storage for StuckKeyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
      self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
      self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
      if key == self.stuck {
        return Err(StorageError::Unavailable("locked".into()));
      }
      self.inner.remove(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
      self.inner.list_keys(prefix).await
    }
  }

  #[tokio::test]
  async fn eviction_stops_at_first_failed_remove() {
    let clock = Arc::new(ManualClock::default());
    let storage = Arc::new(StuckKeyStorage {
      inner: MemoryStorage::new(),
      stuck: "cache:k0".into(),
    });
    let record_size = serde_json::to_string(&CacheEntry::new(
      "x".repeat(100),
      clock.now(),
      Duration::hours(1),
    ))
    .unwrap()
    .len() as u64;
    let cache = ContentCache::new(Arc::clone(&storage))
      .with_settings(CacheSettings {
        capacity_bytes: record_size * 2,
        cleanup_probability: 0.0,
        ..CacheSettings::default()
      })
      .with_clock(clock.clone());

    for i in 0..4 {
      cache.put(&format!("k{}", i), &"x".repeat(100), Duration::hours(1)).await;
      clock.advance(Duration::seconds(1));
    }

    let report = cache.cleanup().await;

    assert_eq!(report.evicted, 0);
    assert_eq!(report.remaining_bytes, record_size * 4);
    for i in 0..4 {
      assert!(cache.get::<String>(&format!("k{}", i)).await.is_some());
    }
  }

  #[tokio::test]
  async fn always_sweeping_put_triggers_cleanup() {
    let settings = CacheSettings {
      cleanup_probability: 1.0,
      ..CacheSettings::default()
    };
    let (cache, storage, clock) = cache_with_clock(settings);

    cache.put("old", &1, Duration::seconds(1)).await;
    clock.advance(Duration::seconds(2));
    cache.put("new", &2, Duration::hours(1)).await;

    assert_eq!(storage.get("cache:old").await.unwrap(), None);
  }

  #[tokio::test]
  async fn stats_counts_entries_and_expired() {
    let (cache, _, clock) = cache_with_clock(quiet_settings());
    cache.put("a", &1, Duration::seconds(1)).await;
    cache.put("b", &2, Duration::hours(1)).await;
    clock.advance(Duration::seconds(5));

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.expired, 1);
    assert!(stats.total_bytes > 0);
  }
}
