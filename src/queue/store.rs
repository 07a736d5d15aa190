//! Durable, ordered queue of pending actions.
//!
//! The whole queue is persisted as one JSON array under [`QUEUE_KEY`]. It is
//! expected to stay small (tens of entries), so every mutation rewrites it.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::action::{Action, ActionKind, PendingAction};
use crate::clock::{Clock, SystemClock};
use crate::storage::Storage;

/// Storage key holding the serialized queue.
pub const QUEUE_KEY: &str = "queue:pending";

/// Durable action queue.
///
/// The in-memory vector is authoritative. Every mutation holds `write_lock`
/// across mutate-then-save so saves land in mutation order and an enqueue
/// racing a drain is never lost.
pub struct ActionQueue<S: Storage> {
  storage: Arc<S>,
  clock: Arc<dyn Clock>,
  pending: Mutex<Vec<PendingAction>>,
  write_lock: tokio::sync::Mutex<()>,
}

impl<S: Storage> ActionQueue<S> {
  /// Restore the queue from storage.
  ///
  /// A missing or unreadable queue starts empty. Records that cannot be
  /// decoded are dropped and the cleaned queue is written back.
  pub async fn load(storage: Arc<S>) -> Self {
    Self::load_with_clock(storage, Arc::new(SystemClock)).await
  }

  pub async fn load_with_clock(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    let (pending, dirty) = match storage.get(QUEUE_KEY).await {
      Ok(Some(raw)) => decode_queue(&raw),
      Ok(None) => (Vec::new(), false),
      Err(e) => {
        warn!(error = %e, "failed to load action queue, starting empty");
        (Vec::new(), false)
      }
    };

    debug!(count = pending.len(), "loaded action queue");

    let queue = Self {
      storage,
      clock,
      pending: Mutex::new(pending),
      write_lock: tokio::sync::Mutex::new(()),
    };

    if dirty {
      let _guard = queue.write_lock.lock().await;
      let snapshot = queue.lock().clone();
      queue.save(&snapshot).await;
    }

    queue
  }

  /// Append a new action and persist the queue.
  pub async fn enqueue(&self, action: Action) -> Uuid {
    let pending = PendingAction::new(action, self.clock.now());
    let id = pending.id;
    debug!(%id, kind = %pending.kind(), "enqueueing action");
    self.mutate(|queue| queue.push(pending)).await;
    id
  }

  /// Number of pending actions.
  pub fn size(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.size() == 0
  }

  /// Copy of the queue in delivery order.
  pub fn pending(&self) -> Vec<PendingAction> {
    self.lock().clone()
  }

  /// Drop every pending action.
  pub async fn clear(&self) {
    self.mutate(|queue| queue.clear()).await;
  }

  /// Swap the live queue for an empty one and return what was in it.
  pub(crate) async fn take_all(&self) -> Vec<PendingAction> {
    let mut taken = Vec::new();
    self.mutate(|queue| std::mem::swap(queue, &mut taken)).await;
    taken
  }

  /// Append an already-existing action (after a failed attempt).
  pub(crate) async fn requeue(&self, action: PendingAction) {
    self.mutate(|queue| queue.push(action)).await;
  }

  async fn mutate<F>(&self, f: F)
  where
    F: FnOnce(&mut Vec<PendingAction>),
  {
    let _guard = self.write_lock.lock().await;
    let snapshot = {
      let mut queue = self.lock();
      f(&mut queue);
      queue.clone()
    };
    self.save(&snapshot).await;
  }

  /// Persist `snapshot`. On failure the in-memory queue stays as it is and
  /// the next successful save catches storage up.
  async fn save(&self, snapshot: &[PendingAction]) {
    let raw = match serde_json::to_string(snapshot) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(error = %e, "failed to serialize action queue");
        return;
      }
    };

    if let Err(e) = self.storage.set(QUEUE_KEY, &raw).await {
      warn!(error = %e, count = snapshot.len(), "failed to persist action queue");
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<PendingAction>> {
    self.pending.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Decode a persisted queue record by record.
///
/// Returns the decoded actions and whether anything had to be dropped.
fn decode_queue(raw: &str) -> (Vec<PendingAction>, bool) {
  let records: Vec<Value> = match serde_json::from_str(raw) {
    Ok(records) => records,
    Err(e) => {
      warn!(error = %e, "action queue is corrupt, discarding it");
      return (Vec::new(), true);
    }
  };

  let mut dirty = false;
  let mut pending = Vec::with_capacity(records.len());

  for record in records {
    match serde_json::from_value::<PendingAction>(record.clone()) {
      Ok(action) => pending.push(action),
      Err(e) => {
        dirty = true;
        match unsupported_kind(&record) {
          Some(kind) => warn!(kind, "dropping queued action of unsupported kind"),
          None => warn!(error = %e, "dropping undecodable queued action"),
        }
      }
    }
  }

  (pending, dirty)
}

/// The kind name of a record whose kind this build does not know.
fn unsupported_kind(record: &Value) -> Option<&str> {
  let kind = record.get("action")?.get("kind")?.as_str()?;
  match kind.parse::<ActionKind>() {
    Ok(_) => None,
    Err(_) => Some(kind),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::MemoryStorage;
  use serde_json::json;

  async fn empty_queue() -> (ActionQueue<MemoryStorage>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let queue = ActionQueue::load(Arc::clone(&storage)).await;
    (queue, storage)
  }

  #[tokio::test]
  async fn enqueue_persists_whole_queue() {
    let (queue, storage) = empty_queue().await;

    let a = queue.enqueue(Action::mark_alert_read("a1").unwrap()).await;
    let b = queue.enqueue(Action::dismiss_alert("a2").unwrap()).await;

    assert_eq!(queue.size(), 2);

    let restored = ActionQueue::load(storage).await;
    let ids: Vec<Uuid> = restored.pending().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![a, b]);
    assert!(restored.pending().iter().all(|p| p.attempt_count == 0));
  }

  #[tokio::test]
  async fn take_all_empties_and_persists() {
    let (queue, storage) = empty_queue().await;
    queue.enqueue(Action::mark_alert_read("a1").unwrap()).await;

    let taken = queue.take_all().await;
    assert_eq!(taken.len(), 1);
    assert!(queue.is_empty());
    assert_eq!(storage.get(QUEUE_KEY).await.unwrap().as_deref(), Some("[]"));
  }

  #[tokio::test]
  async fn requeue_appends_after_newer_actions() {
    let (queue, _) = empty_queue().await;
    queue.enqueue(Action::mark_alert_read("first").unwrap()).await;

    let mut taken = queue.take_all().await;
    let late = queue.enqueue(Action::mark_alert_read("late").unwrap()).await;
    let mut first = taken.remove(0);
    first.attempt_count += 1;
    let first_id = first.id;
    queue.requeue(first).await;

    let order: Vec<Uuid> = queue.pending().iter().map(|p| p.id).collect();
    assert_eq!(order, vec![late, first_id]);
  }

  #[tokio::test]
  async fn corrupt_queue_loads_empty_and_is_purged() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(QUEUE_KEY, "{{{").await.unwrap();

    let queue = ActionQueue::load(Arc::clone(&storage)).await;
    assert!(queue.is_empty());
    assert_eq!(storage.get(QUEUE_KEY).await.unwrap().as_deref(), Some("[]"));
  }

  #[tokio::test]
  async fn unsupported_records_are_dropped_on_load() {
    let storage = Arc::new(MemoryStorage::new());
    let good = PendingAction::new(Action::dismiss_alert("a1").unwrap(), chrono::Utc::now());
    let raw = json!([
      {
        "id": Uuid::new_v4(),
        "action": {"kind": "ARCHIVE_ALERT", "payload": {"alertId": "x"}},
        "enqueued_at": "2024-01-01T00:00:00Z",
        "attempt_count": 0
      },
      "garbage",
      good.clone()
    ]);
    storage.set(QUEUE_KEY, &raw.to_string()).await.unwrap();

    let queue = ActionQueue::load(Arc::clone(&storage)).await;
    assert_eq!(queue.pending(), vec![good]);

    let reloaded = ActionQueue::load(storage).await;
    assert_eq!(reloaded.size(), 1);
  }

  #[tokio::test]
  async fn failed_save_keeps_action_in_memory() {
    let (queue, storage) = empty_queue().await;

    storage.set_failing(true);
    queue.enqueue(Action::mark_alert_read("a1").unwrap()).await;
    assert_eq!(queue.size(), 1);

    storage.set_failing(false);
    queue.enqueue(Action::mark_alert_read("a2").unwrap()).await;

    let restored = ActionQueue::load(storage).await;
    assert_eq!(restored.size(), 2);
  }

  #[test]
  fn unsupported_kind_detection() {
    let record = json!({"action": {"kind": "NOPE"}});
    assert_eq!(unsupported_kind(&record), Some("NOPE"));

    let record = json!({"action": {"kind": "DISMISS_ALERT"}});
    assert_eq!(unsupported_kind(&record), None);
  }
}
