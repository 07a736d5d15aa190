//! Connectivity observation.
//!
//! Raw `is_connected` observations (from an OS callback, or from
//! [`HttpProbe`]) go into a [`NetworkMonitor`], which turns them into
//! deduplicated [`Transition`] events on a broadcast channel.

mod monitor;
mod probe;

pub use monitor::{ConnectivityState, NetworkMonitor, Transition};
pub use probe::HttpProbe;
