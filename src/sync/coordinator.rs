//! Drains the action queue on reconnect and on request.
//!
//! [`SyncCoordinator::drain`] can be called directly. For a long-running
//! process, [`SyncCoordinator::spawn`] starts a task that owns the trigger
//! policy: one drain per offline→online edge, drains requested through the
//! returned [`CoordinatorHandle`], and periodic cache maintenance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::executor::ActionExecutor;
use super::report::{ActionOutcome, Disposition, DrainReport};
use crate::cache::ContentCache;
use crate::config::{CLEANUP_INTERVAL_SECS, MAX_RETRY};
use crate::network::{NetworkMonitor, Transition};
use crate::queue::ActionQueue;
use crate::storage::Storage;

const REQUEST_CHANNEL_CAPACITY: usize = 8;
const REPORT_CHANNEL_CAPACITY: usize = 16;

/// Retry and maintenance tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
  /// Retries after the first attempt before an action is dropped.
  pub max_retry: u32,
  pub cleanup_interval: Duration,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      max_retry: MAX_RETRY,
      cleanup_interval: Duration::from_secs(CLEANUP_INTERVAL_SECS),
    }
  }
}

pub struct SyncCoordinator<S: Storage> {
  queue: Arc<ActionQueue<S>>,
  cache: Arc<ContentCache<S>>,
  executor: Arc<dyn ActionExecutor>,
  monitor: NetworkMonitor,
  settings: SyncSettings,
  drains: AtomicU64,
  reports: broadcast::Sender<DrainReport>,
}

impl<S: Storage> SyncCoordinator<S> {
  pub fn new(
    queue: Arc<ActionQueue<S>>,
    cache: Arc<ContentCache<S>>,
    executor: Arc<dyn ActionExecutor>,
    monitor: NetworkMonitor,
  ) -> Self {
    let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
    Self {
      queue,
      cache,
      executor,
      monitor,
      settings: SyncSettings::default(),
      drains: AtomicU64::new(0),
      reports,
    }
  }

  pub fn with_settings(mut self, settings: SyncSettings) -> Self {
    self.settings = settings;
    self
  }

  pub fn queue(&self) -> &Arc<ActionQueue<S>> {
    &self.queue
  }

  pub fn cache(&self) -> &Arc<ContentCache<S>> {
    &self.cache
  }

  pub fn monitor(&self) -> &NetworkMonitor {
    &self.monitor
  }

  pub fn settings(&self) -> &SyncSettings {
    &self.settings
  }

  /// Number of drains that ran while online.
  pub fn completed_drains(&self) -> u64 {
    self.drains.load(Ordering::SeqCst)
  }

  /// Receive the report of every future drain that ran while online.
  pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
    self.reports.subscribe()
  }

  /// Deliver everything currently queued.
  ///
  /// Offline this does nothing. Otherwise the live queue is swapped for an
  /// empty one and the snapshot is executed one action at a time, in order.
  /// Actions enqueued meanwhile wait for the next drain; failed actions are
  /// appended behind them.
  pub async fn drain(&self) -> DrainReport {
    if !self.monitor.is_online() {
      debug!("offline, skipping drain");
      return DrainReport::offline();
    }

    let batch = self.queue.take_all().await;
    if !batch.is_empty() {
      info!(count = batch.len(), "draining action queue");
    }

    let mut report = DrainReport::default();
    for mut action in batch {
      let (disposition, error) = match self.executor.execute(&action).await {
        Ok(()) => {
          debug!(id = %action.id, kind = %action.kind(), "action delivered");
          (Disposition::Delivered, None)
        }
        Err(e) if !e.is_retryable() => {
          warn!(id = %action.id, kind = %action.kind(), error = %e, "dropping action");
          (Disposition::Dropped, Some(e))
        }
        Err(e) if action.attempt_count >= self.settings.max_retry => {
          warn!(
            id = %action.id,
            kind = %action.kind(),
            attempts = action.attempt_count + 1,
            error = %e,
            "dropping action after final retry"
          );
          (Disposition::Dropped, Some(e))
        }
        Err(e) => {
          action.attempt_count += 1;
          let attempt_count = action.attempt_count;
          debug!(id = %action.id, attempt_count, error = %e, "requeueing action");
          self.queue.requeue(action.clone()).await;
          (Disposition::Requeued { attempt_count }, Some(e))
        }
      };

      report.add(ActionOutcome {
        id: action.id,
        kind: action.kind(),
        disposition,
        error,
      });
    }

    self.drains.fetch_add(1, Ordering::SeqCst);
    if report.total() > 0 {
      info!(
        succeeded = report.succeeded,
        retried = report.retried,
        dropped = report.dropped,
        "drain finished"
      );
    }
    let _ = self.reports.send(report.clone());
    report
  }
}

impl<S: Storage + 'static> SyncCoordinator<S> {
  /// Start the trigger loop.
  ///
  /// Transitions are subscribed to before this returns, so an edge observed
  /// right after `spawn` is not missed.
  pub fn spawn(self: Arc<Self>) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let transitions = self.monitor.subscribe();
    let task = tokio::spawn(self.run(rx, transitions));
    (CoordinatorHandle { requests: tx }, task)
  }

  async fn run(
    self: Arc<Self>,
    mut requests: mpsc::Receiver<Request>,
    mut transitions: broadcast::Receiver<Transition>,
  ) {
    let mut maintenance = tokio::time::interval(self.settings.cleanup_interval);
    maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    maintenance.tick().await;

    let mut transitions_open = true;
    debug!("sync coordinator started");

    loop {
      tokio::select! {
        request = requests.recv() => match request {
          Some(Request::Drain(reply)) => {
            let report = self.drain().await;
            let _ = reply.send(report);
          }
          Some(Request::Shutdown) | None => break,
        },
        transition = transitions.recv(), if transitions_open => match transition {
          Ok(transition) if transition.online => {
            self.drain().await;
          }
          Ok(_) => {}
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            // An online edge may be among the skipped ones.
            warn!(skipped, "missed connectivity transitions");
            if self.monitor.is_online() {
              self.drain().await;
            }
          }
          Err(broadcast::error::RecvError::Closed) => transitions_open = false,
        },
        _ = maintenance.tick() => {
          let report = self.cache.cleanup().await;
          debug!(?report, "scheduled cache maintenance");
        }
      }
    }

    debug!("sync coordinator stopped");
  }
}

enum Request {
  Drain(oneshot::Sender<DrainReport>),
  Shutdown,
}

/// Talks to a running coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
  requests: mpsc::Sender<Request>,
}

impl CoordinatorHandle {
  /// Request a drain and wait for its report. `None` once the task is gone.
  pub async fn drain(&self) -> Option<DrainReport> {
    let (tx, rx) = oneshot::channel();
    self.requests.send(Request::Drain(tx)).await.ok()?;
    rx.await.ok()
  }

  pub async fn shutdown(&self) {
    let _ = self.requests.send(Request::Shutdown).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::{Action, ActionKind};
  use crate::storage::MemoryStorage;
  use crate::sync::mock::MockExecutor;

  async fn coordinator(
    executor: MockExecutor,
    online: bool,
  ) -> (SyncCoordinator<MemoryStorage>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let queue = Arc::new(ActionQueue::load(Arc::clone(&storage)).await);
    let cache = Arc::new(ContentCache::new(Arc::clone(&storage)));
    let coordinator = SyncCoordinator::new(queue, cache, Arc::new(executor), NetworkMonitor::new(online));
    (coordinator, storage)
  }

  #[tokio::test]
  async fn offline_drain_is_a_no_op() {
    let executor = MockExecutor::succeeding();
    let (coordinator, _) = coordinator(executor.clone(), false).await;
    coordinator.queue().enqueue(Action::mark_alert_read("a1").unwrap()).await;

    let report = coordinator.drain().await;

    assert!(report.skipped_offline);
    assert_eq!(executor.call_count(), 0);
    assert_eq!(coordinator.queue().size(), 1);
    assert_eq!(coordinator.completed_drains(), 0);
  }

  #[tokio::test]
  async fn failure_increments_attempts_and_requeues() {
    let executor = MockExecutor::failing();
    let (coordinator, _) = coordinator(executor, true).await;
    let id = coordinator.queue().enqueue(Action::dismiss_alert("a1").unwrap()).await;

    let report = coordinator.drain().await;

    assert_eq!(report.retried, 1);
    let pending = coordinator.queue().pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].attempt_count, 1);
  }

  #[tokio::test]
  async fn unsupported_kind_is_dropped_and_batch_continues() {
    let executor = MockExecutor::succeeding().without_kind(ActionKind::DismissAlert);
    let (coordinator, _) = coordinator(executor.clone(), true).await;
    coordinator.queue().enqueue(Action::dismiss_alert("a1").unwrap()).await;
    coordinator.queue().enqueue(Action::mark_alert_read("a2").unwrap()).await;

    let report = coordinator.drain().await;

    assert_eq!((report.dropped, report.succeeded), (1, 1));
    assert!(coordinator.queue().is_empty());
    assert_eq!(executor.call_count(), 2);
  }

  #[tokio::test]
  async fn requeued_action_goes_behind_mid_drain_enqueue() {
    let (coordinator, _) = coordinator(MockExecutor::succeeding(), true).await;
    let first = coordinator.queue().enqueue(Action::mark_alert_read("a1").unwrap()).await;

    // Simulate an enqueue landing after the snapshot was taken.
    let mut batch = coordinator.queue().take_all().await;
    let late = coordinator.queue().enqueue(Action::mark_alert_read("a2").unwrap()).await;
    for action in batch.drain(..) {
      coordinator.queue().requeue(action).await;
    }
    let order: Vec<_> = coordinator.queue().pending().iter().map(|p| p.id).collect();
    assert_eq!(order, vec![late, first]);

    let report = coordinator.drain().await;
    assert_eq!(report.outcomes[0].id, late);
    assert_eq!(report.outcomes[1].id, first);
  }

  #[tokio::test]
  async fn handle_drains_and_shuts_down() {
    let executor = MockExecutor::succeeding();
    let (coordinator, _) = coordinator(executor.clone(), true).await;
    coordinator.queue().enqueue(Action::mark_alert_read("a1").unwrap()).await;

    let coordinator = Arc::new(coordinator);
    let (handle, task) = Arc::clone(&coordinator).spawn();

    let report = handle.drain().await.unwrap();
    assert_eq!(report.succeeded, 1);

    handle.shutdown().await;
    task.await.unwrap();
    assert!(handle.drain().await.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn maintenance_tick_sweeps_expired_entries() {
    let (coordinator, storage) = coordinator(MockExecutor::succeeding(), false).await;
    let coordinator = coordinator.with_settings(SyncSettings {
      cleanup_interval: Duration::from_secs(60),
      ..SyncSettings::default()
    });
    coordinator
      .cache()
      .put("stale", &"x", chrono::Duration::milliseconds(1))
      .await;

    let coordinator = Arc::new(coordinator);
    let (handle, task) = Arc::clone(&coordinator).spawn();

    // Let the wall clock pass the entry's expiry, then the virtual timer.
    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    assert!(storage.list_keys("cache:").await.unwrap().is_empty());
    handle.shutdown().await;
    task.await.unwrap();
  }
}
