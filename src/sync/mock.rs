//! Scripted executor for deterministic tests.
//!
//! # Example
//!
//! ```
//! use offsync::sync::mock::{MockExecutor, MockOutcome};
//!
//! // Fail twice, then succeed for everything after.
//! let executor = MockExecutor::succeeding()
//!     .with_script([MockOutcome::Fail, MockOutcome::Fail]);
//! assert_eq!(executor.call_count(), 0);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::executor::{ActionExecutor, ExecutionError};
use crate::queue::{ActionKind, PendingAction};

/// What the mock does for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
  Succeed,
  /// Retryable failure
  Fail,
  /// Non-retryable unsupported-kind failure
  Unsupported,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
  pub id: Uuid,
  pub kind: ActionKind,
  pub attempt_count: u32,
}

/// Mock executor.
///
/// Outcomes are taken from the script in call order; once the script runs
/// out every call gets the fallback outcome. Clones share state.
#[derive(Debug, Clone)]
pub struct MockExecutor {
  inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug)]
struct MockInner {
  script: VecDeque<MockOutcome>,
  fallback: MockOutcome,
  unsupported_kinds: Vec<ActionKind>,
  calls: Vec<MockCall>,
}

impl MockExecutor {
  fn with_fallback(fallback: MockOutcome) -> Self {
    Self {
      inner: Arc::new(Mutex::new(MockInner {
        script: VecDeque::new(),
        fallback,
        unsupported_kinds: Vec::new(),
        calls: Vec::new(),
      })),
    }
  }

  /// Every call succeeds.
  pub fn succeeding() -> Self {
    Self::with_fallback(MockOutcome::Succeed)
  }

  /// Every call fails with a retryable error.
  pub fn failing() -> Self {
    Self::with_fallback(MockOutcome::Fail)
  }

  /// Outcomes for the next calls, in order.
  pub fn with_script(self, script: impl IntoIterator<Item = MockOutcome>) -> Self {
    self.lock().script.extend(script);
    self
  }

  /// Treat `kind` as having no mapping.
  pub fn without_kind(self, kind: ActionKind) -> Self {
    self.lock().unsupported_kinds.push(kind);
    self
  }

  pub fn calls(&self) -> Vec<MockCall> {
    self.lock().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.lock().calls.len()
  }

  fn lock(&self) -> MutexGuard<'_, MockInner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
  async fn execute(&self, action: &PendingAction) -> Result<(), ExecutionError> {
    let mut inner = self.lock();
    inner.calls.push(MockCall {
      id: action.id,
      kind: action.kind(),
      attempt_count: action.attempt_count,
    });

    let outcome = if inner.unsupported_kinds.contains(&action.kind()) {
      MockOutcome::Unsupported
    } else {
      match inner.script.pop_front() {
        Some(outcome) => outcome,
        None => inner.fallback.clone(),
      }
    };

    match outcome {
      MockOutcome::Succeed => Ok(()),
      MockOutcome::Fail => Err(ExecutionError::Transport("mock failure".into())),
      MockOutcome::Unsupported => Err(ExecutionError::Unsupported(action.kind())),
    }
  }
}
