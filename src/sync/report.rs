//! Results of one drain pass.

use std::fmt::Write as _;
use uuid::Uuid;

use super::executor::ExecutionError;
use crate::queue::ActionKind;

/// What happened to one action during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
  /// Accepted by the backend and removed from the queue.
  Delivered,
  /// Failed, back in the queue with the new attempt count.
  Requeued { attempt_count: u32 },
  /// Removed without being delivered.
  Dropped,
}

/// Per-action outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
  pub id: Uuid,
  pub kind: ActionKind,
  pub disposition: Disposition,
  pub error: Option<ExecutionError>,
}

/// Summary of a drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub succeeded: usize,
  pub retried: usize,
  pub dropped: usize,
  /// Set when the drain was requested while offline and did nothing.
  pub skipped_offline: bool,
  pub outcomes: Vec<ActionOutcome>,
}

impl DrainReport {
  pub fn offline() -> Self {
    Self {
      skipped_offline: true,
      ..Self::default()
    }
  }

  pub fn add(&mut self, outcome: ActionOutcome) {
    match outcome.disposition {
      Disposition::Delivered => self.succeeded += 1,
      Disposition::Requeued { .. } => self.retried += 1,
      Disposition::Dropped => self.dropped += 1,
    }
    self.outcomes.push(outcome);
  }

  /// Actions attempted in this pass.
  pub fn total(&self) -> usize {
    self.outcomes.len()
  }

  /// No action was requeued or dropped.
  pub fn all_succeeded(&self) -> bool {
    self.retried == 0 && self.dropped == 0
  }
}

/// Human-readable summary for the CLI.
pub fn format_drain_report(report: &DrainReport) -> String {
  if report.skipped_offline {
    return "Offline: nothing was sent".to_string();
  }
  if report.total() == 0 {
    return "Queue is empty".to_string();
  }

  let mut out = String::new();
  let _ = writeln!(out, "Drained {} action(s)", report.total());
  let _ = writeln!(out, "{}", "-".repeat(40));
  if report.succeeded > 0 {
    let _ = writeln!(out, "  delivered  {}", report.succeeded);
  }
  if report.retried > 0 {
    let _ = writeln!(out, "  requeued   {}", report.retried);
  }
  if report.dropped > 0 {
    let _ = writeln!(out, "  dropped    {}", report.dropped);
  }

  if !report.all_succeeded() {
    let _ = writeln!(out);
    let failures = report
      .outcomes
      .iter()
      .filter(|o| o.disposition != Disposition::Delivered);
    for outcome in failures {
      let reason = outcome
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_default();
      let _ = writeln!(out, "  {} {} {}", outcome.kind, outcome.id, reason);
    }
  }

  out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn outcome(disposition: Disposition) -> ActionOutcome {
    ActionOutcome {
      id: Uuid::new_v4(),
      kind: ActionKind::DismissAlert,
      disposition,
      error: None,
    }
  }

  #[test]
  fn counts_follow_dispositions() {
    let mut report = DrainReport::default();
    report.add(outcome(Disposition::Delivered));
    report.add(outcome(Disposition::Requeued { attempt_count: 1 }));
    report.add(outcome(Disposition::Dropped));

    assert_eq!((report.succeeded, report.retried, report.dropped), (1, 1, 1));
    assert_eq!(report.total(), 3);
    assert!(!report.all_succeeded());
  }

  #[test]
  fn format_lists_failures_only() {
    let mut report = DrainReport::default();
    report.add(outcome(Disposition::Delivered));
    let mut failed = outcome(Disposition::Dropped);
    failed.error = Some(ExecutionError::Unsupported(ActionKind::DismissAlert));
    let failed_id = failed.id;
    report.add(failed);

    let text = format_drain_report(&report);
    assert!(text.starts_with("Drained 2 action(s)"));
    assert!(text.contains("dropped    1"));
    assert!(text.contains(&failed_id.to_string()));
    assert!(text.contains("unsupported action kind"));
  }

  #[test]
  fn format_clean_pass_has_no_failure_section() {
    let mut report = DrainReport::default();
    let delivered = outcome(Disposition::Delivered);
    let delivered_id = delivered.id;
    report.add(delivered);

    assert!(report.all_succeeded());
    let text = format_drain_report(&report);
    assert_eq!(text.lines().count(), 3);
    assert!(text.ends_with("delivered  1"));
    assert!(!text.contains(&delivered_id.to_string()));
  }

  #[test]
  fn format_offline_and_empty() {
    assert_eq!(format_drain_report(&DrainReport::offline()), "Offline: nothing was sent");
    assert_eq!(format_drain_report(&DrainReport::default()), "Queue is empty");
  }
}
