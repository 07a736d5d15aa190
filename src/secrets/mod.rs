//! Secret storage for the backend bearer token.
//!
//! - [`FileSecretStore`]: YAML file with owner-only permissions (default)
//! - [`EnvSecretStore`]: read-only, reads `OFFSYNC_*` environment variables
//!
//! The executor reads the token on every request, so a rotated token is
//! picked up without restarting or touching queued actions.

mod env_store;
mod file_store;
mod traits;

use std::path::PathBuf;

pub use env_store::EnvSecretStore;
pub use file_store::FileSecretStore;
pub use traits::{SecretError, SecretStore};

/// Secret key holding the backend API token.
pub const TOKEN_KEY: &str = "backend.token";

/// The default secret store provider name.
pub const DEFAULT_PROVIDER: &str = "file";

/// Create a secret store by provider name (`file` or `env`).
///
/// `path` overrides the file store location.
pub fn create_store(
  provider: &str,
  path: Option<PathBuf>,
) -> Result<Box<dyn SecretStore>, SecretError> {
  match provider {
    "file" => match path {
      Some(path) => Ok(Box::new(FileSecretStore::with_path(path))),
      None => Ok(Box::new(FileSecretStore::new()?)),
    },
    "env" => Ok(Box::new(EnvSecretStore::new())),
    other => Err(SecretError::ProviderNotAvailable(format!(
      "unknown secret provider: '{}' (valid: file, env)",
      other
    ))),
  }
}
