//! In-memory storage with optional fault injection.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::traits::{Storage, StorageError};

/// Storage that keeps everything in a `BTreeMap`.
///
/// Used for ephemeral hosts and tests. [`MemoryStorage::set_failing`] makes
/// every subsequent call fail, which is how the error-absorbing paths of the
/// cache and queue are exercised.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<BTreeMap<String, String>>,
  failing: AtomicBool,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make every call fail (`true`) or succeed again (`false`).
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Number of stored keys, bypassing fault injection.
  pub fn len(&self) -> usize {
    self.lock().map(|m| m.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn check(&self) -> Result<(), StorageError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(StorageError::Unavailable("injected failure".into()));
    }
    Ok(())
  }

  fn lock(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
    self
      .entries
      .lock()
      .map_err(|e| StorageError::Poisoned(e.to_string()))
  }
}

#[async_trait]
impl Storage for MemoryStorage {
  async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    self.check()?;
    Ok(self.lock()?.get(key).cloned())
  }

  async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.check()?;
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.check()?;
    self.lock()?.remove(key);
    Ok(())
  }

  async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    self.check()?;
    Ok(
      self
        .lock()?
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn list_keys_is_prefix_scoped_and_sorted() {
    let storage = MemoryStorage::new();
    storage.set("cache:z", "1").await.unwrap();
    storage.set("cache:a", "1").await.unwrap();
    storage.set("queue:pending", "[]").await.unwrap();

    assert_eq!(
      storage.list_keys("cache:").await.unwrap(),
      vec!["cache:a".to_string(), "cache:z".to_string()]
    );
  }

  #[tokio::test]
  async fn injected_failures_hit_every_call() {
    let storage = MemoryStorage::new();
    storage.set("k", "v").await.unwrap();
    storage.set_failing(true);

    assert!(storage.get("k").await.is_err());
    assert!(storage.set("k", "w").await.is_err());
    assert!(storage.remove("k").await.is_err());
    assert!(storage.list_keys("").await.is_err());

    storage.set_failing(false);
    assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));
  }
}
