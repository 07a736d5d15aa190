//! Connectivity state with edge-triggered transition events.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};

/// Capacity of the transition channel. Edges are rare; a lagging subscriber
/// only ever needs the latest state, which it can read from the monitor.
const TRANSITION_CHANNEL_CAPACITY: usize = 16;

/// Current connectivity as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
  pub is_online: bool,
  pub last_transition_at: DateTime<Utc>,
}

/// An offline→online or online→offline edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub online: bool,
  pub at: DateTime<Utc>,
}

/// Deduplicates raw connectivity observations into transitions.
///
/// Cheap to clone; all clones share state and subscribers.
#[derive(Clone)]
pub struct NetworkMonitor {
  inner: Arc<MonitorInner>,
}

struct MonitorInner {
  state: Mutex<ConnectivityState>,
  transitions: broadcast::Sender<Transition>,
  clock: Arc<dyn Clock>,
}

impl NetworkMonitor {
  /// Create a monitor with a known starting state.
  pub fn new(initially_online: bool) -> Self {
    Self::with_clock(initially_online, Arc::new(SystemClock))
  }

  pub fn with_clock(initially_online: bool, clock: Arc<dyn Clock>) -> Self {
    let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
    let state = ConnectivityState {
      is_online: initially_online,
      last_transition_at: clock.now(),
    };
    Self {
      inner: Arc::new(MonitorInner {
        state: Mutex::new(state),
        transitions,
        clock,
      }),
    }
  }

  pub fn is_online(&self) -> bool {
    self.state().is_online
  }

  pub fn state(&self) -> ConnectivityState {
    *self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Feed one raw observation.
  ///
  /// Returns the transition if this observation changed the state; repeated
  /// observations of the current state are swallowed.
  pub fn observe(&self, is_connected: bool) -> Option<Transition> {
    let transition = {
      let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
      if state.is_online == is_connected {
        return None;
      }
      let at = self.inner.clock.now();
      state.is_online = is_connected;
      state.last_transition_at = at;
      Transition {
        online: is_connected,
        at,
      }
    };

    if transition.online {
      info!("connectivity restored");
    } else {
      info!("connectivity lost");
    }

    // No subscribers is fine.
    let _ = self.inner.transitions.send(transition);
    Some(transition)
  }

  /// Receive every future transition.
  pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
    self.inner.transitions.subscribe()
  }

  /// Invoke `callback` for every future transition.
  ///
  /// The callback runs on its own task, which ends when the returned handle
  /// is aborted or every monitor clone is dropped.
  pub fn on_transition<F>(&self, callback: F) -> JoinHandle<()>
  where
    F: Fn(Transition) + Send + 'static,
  {
    let mut rx = self.subscribe();
    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(transition) => callback(transition),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            debug!(skipped, "transition callback lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }

  /// Feed raw observations from `source` until it ends.
  pub fn attach<St>(&self, source: St) -> JoinHandle<()>
  where
    St: Stream<Item = bool> + Send + 'static,
  {
    let monitor = self.clone();
    tokio::spawn(async move {
      let mut source = Box::pin(source);
      while let Some(is_connected) = source.next().await {
        monitor.observe(is_connected);
      }
      debug!("connectivity source ended");
    })
  }
}
