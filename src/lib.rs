//! Offline-first content cache and durable action queue.
//!
//! - [`cache::ContentCache`] serves previously fetched data with TTL
//!   expiration and capacity-bounded eviction.
//! - [`queue::ActionQueue`] durably records mutations made while offline.
//! - [`sync::SyncCoordinator`] replays them through an
//!   [`sync::ActionExecutor`] on demand and whenever
//!   [`network::NetworkMonitor`] reports an offline→online edge.
//!
//! Everything persists through the [`storage::Storage`] key/value trait.

pub mod cache;
pub mod clock;
pub mod config;
pub mod logging;
pub mod network;
pub mod queue;
pub mod secrets;
pub mod storage;
pub mod sync;
