//! Durable queue of mutations made while offline.
//!
//! Actions are validated when they are built ([`Action`]), appended to an
//! ordered in-memory queue, and the whole queue is rewritten to storage after
//! every change. Delivery and retry live in [`crate::sync`].

mod action;
mod store;

pub use action::{Action, ActionError, ActionKind, AlertRef, Feedback, ObjectPayload, PendingAction};
pub use store::{ActionQueue, QUEUE_KEY};
