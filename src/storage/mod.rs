//! Asynchronous key/value persistence shared by the content cache and the
//! action queue.
//!
//! Backends:
//! - [`SqliteStorage`]: a single `kv_store` table in a local SQLite file
//! - [`MemoryStorage`]: a process-local map, used for tests and ephemeral runs

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError};
