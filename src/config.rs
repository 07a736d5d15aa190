use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CacheSettings, MAX_TTL_DAYS};
use crate::secrets::DEFAULT_PROVIDER;
use crate::sync::SyncSettings;

/// Cache budget: 50 MB of serialized entries.
pub const CACHE_CAPACITY: u64 = 50 * 1024 * 1024;
/// 24 hours
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
/// Retries after the first attempt, so an action gets `MAX_RETRY + 1` tries.
pub const MAX_RETRY: u32 = 3;
/// Chance that a cache write also runs a cleanup pass.
pub const CLEANUP_PROBABILITY: f64 = 0.1;
pub const CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
pub const PROBE_INTERVAL_SECS: u64 = 15;
const MAX_TTL_SECS: u64 = MAX_TTL_DAYS as u64 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub backend: BackendConfig,
  pub cache: CacheConfig,
  pub queue: QueueConfig,
  pub storage: StorageConfig,
  pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
  /// Base URL of the REST API, e.g. "https://api.example.com" or
  /// "https://example.com/v2". Endpoint paths are appended to its path.
  pub url: Option<String>,
  /// Path probed for reachability, appended to `url`
  pub health_path: String,
  pub probe_interval_secs: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      url: None,
      health_path: "/health".to_string(),
      probe_interval_secs: PROBE_INTERVAL_SECS,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub capacity_bytes: u64,
  pub default_ttl_secs: u64,
  pub cleanup_probability: f64,
  pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      capacity_bytes: CACHE_CAPACITY,
      default_ttl_secs: DEFAULT_TTL_SECS,
      cleanup_probability: CLEANUP_PROBABILITY,
      cleanup_interval_secs: CLEANUP_INTERVAL_SECS,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  pub max_retry: u32,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      max_retry: MAX_RETRY,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite database file (defaults to the platform data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
  /// "file" or "env"
  pub provider: String,
  /// Secrets file for the "file" provider
  pub path: Option<PathBuf>,
}

impl Default for SecretsConfig {
  fn default() -> Self {
    Self {
      provider: DEFAULT_PROVIDER.to_string(),
      path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offsync/config.yaml
  ///
  /// With no file found every setting takes its default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is valid and means "all defaults".
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.cache.cleanup_probability) {
      return Err(eyre!(
        "cache.cleanup_probability must be between 0 and 1, got {}",
        self.cache.cleanup_probability
      ));
    }
    if self.cache.default_ttl_secs == 0 {
      return Err(eyre!("cache.default_ttl_secs must be positive"));
    }
    if self.cache.default_ttl_secs > MAX_TTL_SECS {
      return Err(eyre!(
        "cache.default_ttl_secs must be at most {}, got {}",
        MAX_TTL_SECS,
        self.cache.default_ttl_secs
      ));
    }
    if self.cache.cleanup_interval_secs == 0 || self.backend.probe_interval_secs == 0 {
      return Err(eyre!("intervals must be positive"));
    }
    Ok(())
  }

  /// Backend base URL; an error when unset, since delivery needs it.
  pub fn base_url(&self) -> Result<Url> {
    let raw = self
      .backend
      .url
      .as_deref()
      .ok_or_else(|| eyre!("backend.url is not configured"))?;
    Url::parse(raw).map_err(|e| eyre!("Invalid backend.url {}: {}", raw, e))
  }

  /// `health_path` appended to the base URL, keeping any base path prefix.
  pub fn health_url(&self) -> Result<Url> {
    let mut url = self.base_url()?;
    url
      .path_segments_mut()
      .map_err(|_| eyre!("backend.url cannot carry a path"))?
      .pop_if_empty()
      .extend(self.backend.health_path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.backend.probe_interval_secs)
  }

  pub fn cache_settings(&self) -> CacheSettings {
    CacheSettings {
      capacity_bytes: self.cache.capacity_bytes,
      default_ttl: i64::try_from(self.cache.default_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| chrono::Duration::days(MAX_TTL_DAYS)),
      cleanup_probability: self.cache.cleanup_probability,
    }
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      max_retry: self.queue.max_retry,
      cleanup_interval: Duration::from_secs(self.cache.cleanup_interval_secs),
    }
  }
}
