//! File-based secret storage.
//!
//! Secrets live in a YAML map at `$XDG_DATA_HOME/offsync/secrets.yaml`. The
//! file is created with 0600 permissions on Unix and replaced atomically
//! (temp file + rename) on every write.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use super::traits::{SecretError, SecretStore};

#[derive(Debug)]
pub struct FileSecretStore {
  path: PathBuf,
}

impl FileSecretStore {
  /// Store at the default location.
  pub fn new() -> Result<Self, SecretError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| SecretError::ReadError("cannot determine data directory".into()))?;
    Ok(Self {
      path: data_dir.join("offsync").join("secrets.yaml"),
    })
  }

  pub fn with_path(path: PathBuf) -> Self {
    Self { path }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read_secrets(&self) -> Result<BTreeMap<String, String>, SecretError> {
    if !self.path.exists() {
      return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(&self.path)
      .map_err(|e| SecretError::ReadError(format!("cannot read secrets file: {}", e)))?;

    if content.trim().is_empty() {
      return Ok(BTreeMap::new());
    }

    serde_yaml::from_str(&content)
      .map_err(|e| SecretError::ReadError(format!("cannot parse secrets file: {}", e)))
  }

  fn write_secrets(&self, secrets: &BTreeMap<String, String>) -> Result<(), SecretError> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)
        .map_err(|e| SecretError::WriteError(format!("cannot create directory: {}", e)))?;
    }

    let content = serde_yaml::to_string(secrets)
      .map_err(|e| SecretError::WriteError(format!("cannot serialize secrets: {}", e)))?;

    let temp_path = self.path.with_extension("tmp");
    {
      let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| SecretError::WriteError(format!("cannot create temp file: {}", e)))?;

      // Restrict before any content is written.
      #[cfg(unix)]
      file
        .set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|e| SecretError::WriteError(format!("cannot set permissions: {}", e)))?;

      file
        .write_all(content.as_bytes())
        .map_err(|e| SecretError::WriteError(format!("cannot write secrets: {}", e)))?;
      file
        .sync_all()
        .map_err(|e| SecretError::WriteError(format!("cannot sync to disk: {}", e)))?;
    }

    fs::rename(&temp_path, &self.path)
      .map_err(|e| SecretError::WriteError(format!("cannot rename temp file: {}", e)))
  }
}

impl SecretStore for FileSecretStore {
  fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
    Ok(self.read_secrets()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
    let mut secrets = self.read_secrets()?;
    secrets.insert(key.to_string(), value.to_string());
    self.write_secrets(&secrets)
  }

  fn delete(&self, key: &str) -> Result<(), SecretError> {
    let mut secrets = self.read_secrets()?;
    if secrets.remove(key).is_none() {
      return Ok(());
    }
    self.write_secrets(&secrets)
  }
}
