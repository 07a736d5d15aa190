//! SQLite-backed key/value storage.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::traits::{Storage, StorageError};

/// Schema for the key/value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-based storage implementation.
///
/// The connection lives behind a mutex and every call runs on the blocking
/// thread pool so the async runtime never stalls on disk I/O.
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  /// Open the database at the default location.
  pub fn open_default() -> Result<Self, StorageError> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StorageError::Backend(format!(
        "failed to open storage at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StorageError> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| StorageError::Backend(format!("failed to run storage migrations: {}", e)))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Unavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("offsync").join("store.db"))
  }

  /// Run `f` against the connection on the blocking pool.
  async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
  {
    let conn = Arc::clone(&self.conn);
    tokio::task::spawn_blocking(move || {
      let conn = conn
        .lock()
        .map_err(|e| StorageError::Poisoned(e.to_string()))?;
      f(&conn).map_err(StorageError::from)
    })
    .await
    .map_err(|e| StorageError::Backend(format!("storage task failed: {}", e)))?
  }
}

#[async_trait]
impl Storage for SqliteStorage {
  async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn
          .query_row(
            "SELECT value FROM kv_store WHERE key = ?",
            params![key],
            |row| row.get(0),
          )
          .optional()
      })
      .await
  }

  async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let key = key.to_string();
    let value = value.to_string();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
           VALUES (?, ?, datetime('now'))",
          params![key, value],
        )?;
        Ok(())
      })
      .await
  }

  async fn remove(&self, key: &str) -> Result<(), StorageError> {
    let key = key.to_string();
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        Ok(())
      })
      .await
  }

  async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
    let prefix = prefix.to_string();
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT key FROM kv_store
           WHERE substr(key, 1, length(?1)) = ?1
           ORDER BY key",
        )?;
        let keys = stmt
          .query_map(params![prefix], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
      })
      .await
  }
}
