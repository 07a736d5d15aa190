//! Storage trait and error type shared by every backend.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reading or writing the persistence layer.
///
/// Callers inside this crate never propagate these to their own callers; they
/// are logged and folded into a miss or a no-op.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage backend error: {0}")]
  Backend(String),

  #[error("storage I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage lock poisoned: {0}")]
  Poisoned(String),

  #[error("storage unavailable: {0}")]
  Unavailable(String),
}

impl From<rusqlite::Error> for StorageError {
  fn from(e: rusqlite::Error) -> Self {
    StorageError::Backend(e.to_string())
  }
}

/// Asynchronous string key/value persistence.
///
/// There are no transactions and no compare-and-swap: a `set` simply
/// overwrites whatever was stored under the key.
#[async_trait]
pub trait Storage: Send + Sync {
  /// Load the value stored under `key`, if any.
  async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

  /// Store `value` under `key`, replacing any previous value.
  async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

  /// Delete `key`. Deleting a missing key is not an error.
  async fn remove(&self, key: &str) -> Result<(), StorageError>;

  /// List every key starting with `prefix`, in ascending key order.
  async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
