//! Secret storage trait definition.
//!
//! Keys are namespaced strings such as `backend.token`. Implementations must
//! be thread-safe and must never log or include secret values in errors.

use thiserror::Error;

/// Errors from secret storage operations.
///
/// Messages never contain secret values.
#[derive(Debug, Error)]
pub enum SecretError {
  #[error("failed to read secret: {0}")]
  ReadError(String),

  #[error("failed to write secret: {0}")]
  WriteError(String),

  #[error("secret provider not available: {0}")]
  ProviderNotAvailable(String),
}

/// Key/value store for credentials.
pub trait SecretStore: Send + Sync {
  /// `Ok(None)` when the key has no value.
  fn get(&self, key: &str) -> Result<Option<String>, SecretError>;

  /// Overwrite the value for `key`.
  fn set(&self, key: &str, value: &str) -> Result<(), SecretError>;

  /// Remove `key`. Deleting a missing key succeeds.
  fn delete(&self, key: &str) -> Result<(), SecretError>;
}
