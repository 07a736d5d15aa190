//! Replaying queued actions against the backend.
//!
//! - [`ActionExecutor`] delivers one action; [`HttpActionExecutor`] is the
//!   REST implementation and [`mock::MockExecutor`] a scripted one.
//! - [`SyncCoordinator`] drains the queue through an executor, on demand and
//!   on every offline→online edge.

mod coordinator;
mod executor;
pub mod mock;
mod report;

pub use coordinator::{CoordinatorHandle, SyncCoordinator, SyncSettings};
pub use executor::{ActionExecutor, ApiRequest, ExecutionError, HttpActionExecutor};
pub use report::{format_drain_report, ActionOutcome, Disposition, DrainReport};
