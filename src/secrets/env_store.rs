//! Read-only secret store backed by environment variables.

use super::traits::{SecretError, SecretStore};

/// Maps `backend.token` to `OFFSYNC_BACKEND_TOKEN`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
  prefix: String,
}

impl EnvSecretStore {
  pub fn new() -> Self {
    Self::with_prefix("OFFSYNC")
  }

  pub fn with_prefix(prefix: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
    }
  }

  /// Environment variable consulted for `key`.
  pub fn var_name(&self, key: &str) -> String {
    let suffix: String = key
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() {
          c.to_ascii_uppercase()
        } else {
          '_'
        }
      })
      .collect();
    format!("{}_{}", self.prefix, suffix)
  }
}

impl Default for EnvSecretStore {
  fn default() -> Self {
    Self::new()
  }
}

impl SecretStore for EnvSecretStore {
  fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
    match std::env::var(self.var_name(key)) {
      Ok(value) if !value.is_empty() => Ok(Some(value)),
      Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
      Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::ReadError(format!(
        "{} is not valid unicode",
        self.var_name(key)
      ))),
    }
  }

  fn set(&self, key: &str, _value: &str) -> Result<(), SecretError> {
    Err(SecretError::WriteError(format!(
      "environment store is read-only; export {} instead",
      self.var_name(key)
    )))
  }

  fn delete(&self, key: &str) -> Result<(), SecretError> {
    Err(SecretError::WriteError(format!(
      "environment store is read-only; unset {} instead",
      self.var_name(key)
    )))
  }
}
