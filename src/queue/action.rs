//! Action types that can be queued and their payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Rejected action payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
  #[error("invalid {kind} payload: {reason}")]
  InvalidPayload { kind: ActionKind, reason: String },

  #[error("unknown action kind: {0}")]
  UnknownKind(String),
}

/// The kinds of mutation the backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
  UpdateSettings,
  MarkAlertRead,
  DismissAlert,
  UpdateNotificationPreferences,
  SyncDashboardConfig,
  SubmitFeedback,
}

impl ActionKind {
  pub const ALL: [ActionKind; 6] = [
    ActionKind::UpdateSettings,
    ActionKind::MarkAlertRead,
    ActionKind::DismissAlert,
    ActionKind::UpdateNotificationPreferences,
    ActionKind::SyncDashboardConfig,
    ActionKind::SubmitFeedback,
  ];

  /// Wire name, e.g. `MARK_ALERT_READ`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::UpdateSettings => "UPDATE_SETTINGS",
      Self::MarkAlertRead => "MARK_ALERT_READ",
      Self::DismissAlert => "DISMISS_ALERT",
      Self::UpdateNotificationPreferences => "UPDATE_NOTIFICATION_PREFERENCES",
      Self::SyncDashboardConfig => "SYNC_DASHBOARD_CONFIG",
      Self::SubmitFeedback => "SUBMIT_FEEDBACK",
    }
  }
}

impl std::fmt::Display for ActionKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ActionKind {
  type Err = ActionError;

  /// Accepts the wire name in any case, with `-` or `_` separators.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_uppercase().replace('-', "_");
    Self::ALL
      .into_iter()
      .find(|kind| kind.as_str() == normalized)
      .ok_or_else(|| ActionError::UnknownKind(s.to_string()))
  }
}

/// A JSON object body (settings, preferences, dashboard config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPayload(Map<String, Value>);

impl ObjectPayload {
  fn parse(kind: ActionKind, value: Value) -> Result<Self, ActionError> {
    match value {
      Value::Object(map) if !map.is_empty() => Ok(Self(map)),
      Value::Object(_) => Err(invalid(kind, "object must not be empty")),
      _ => Err(invalid(kind, "expected a JSON object")),
    }
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }
}

/// Reference to a single alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRef {
  #[serde(rename = "alertId")]
  alert_id: String,
}

impl AlertRef {
  fn parse(kind: ActionKind, alert_id: &str) -> Result<Self, ActionError> {
    let alert_id = alert_id.trim();
    if alert_id.is_empty() {
      return Err(invalid(kind, "alertId must not be empty"));
    }
    // Becomes a path segment.
    if alert_id.contains(['/', '?', '#']) {
      return Err(invalid(kind, "alertId must not contain '/', '?' or '#'"));
    }
    if alert_id == "." || alert_id == ".." {
      return Err(invalid(kind, "alertId must not be a dot segment"));
    }
    Ok(Self {
      alert_id: alert_id.to_string(),
    })
  }

  pub fn alert_id(&self) -> &str {
    &self.alert_id
  }
}

/// User feedback submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
  message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  rating: Option<u8>,
}

impl Feedback {
  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn category(&self) -> Option<&str> {
    self.category.as_deref()
  }

  pub fn rating(&self) -> Option<u8> {
    self.rating
  }
}

/// A mutation to replay against the backend, tagged by kind.
///
/// Construct through the associated functions so payloads are validated up
/// front rather than when the action finally executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
  UpdateSettings(ObjectPayload),
  MarkAlertRead(AlertRef),
  DismissAlert(AlertRef),
  UpdateNotificationPreferences(ObjectPayload),
  SyncDashboardConfig(ObjectPayload),
  SubmitFeedback(Feedback),
}

impl Action {
  pub fn update_settings(settings: Value) -> Result<Self, ActionError> {
    ObjectPayload::parse(ActionKind::UpdateSettings, settings).map(Self::UpdateSettings)
  }

  pub fn mark_alert_read(alert_id: &str) -> Result<Self, ActionError> {
    AlertRef::parse(ActionKind::MarkAlertRead, alert_id).map(Self::MarkAlertRead)
  }

  pub fn dismiss_alert(alert_id: &str) -> Result<Self, ActionError> {
    AlertRef::parse(ActionKind::DismissAlert, alert_id).map(Self::DismissAlert)
  }

  pub fn update_notification_preferences(preferences: Value) -> Result<Self, ActionError> {
    ObjectPayload::parse(ActionKind::UpdateNotificationPreferences, preferences)
      .map(Self::UpdateNotificationPreferences)
  }

  pub fn sync_dashboard_config(config: Value) -> Result<Self, ActionError> {
    ObjectPayload::parse(ActionKind::SyncDashboardConfig, config).map(Self::SyncDashboardConfig)
  }

  pub fn submit_feedback(
    message: &str,
    category: Option<&str>,
    rating: Option<u8>,
  ) -> Result<Self, ActionError> {
    let kind = ActionKind::SubmitFeedback;
    let message = message.trim();
    if message.is_empty() {
      return Err(invalid(kind, "message must not be empty"));
    }
    if let Some(r) = rating {
      if !(1..=5).contains(&r) {
        return Err(invalid(kind, "rating must be between 1 and 5"));
      }
    }
    Ok(Self::SubmitFeedback(Feedback {
      message: message.to_string(),
      category: category.map(str::trim).filter(|c| !c.is_empty()).map(String::from),
      rating,
    }))
  }

  /// Build an action from a kind and a loosely-typed JSON payload.
  ///
  /// Alert kinds accept `{"alertId": "..."}` or a bare string; feedback
  /// accepts `{"message": ..., "category"?: ..., "rating"?: ...}`.
  pub fn from_parts(kind: ActionKind, payload: Value) -> Result<Self, ActionError> {
    match kind {
      ActionKind::UpdateSettings => Self::update_settings(payload),
      ActionKind::UpdateNotificationPreferences => Self::update_notification_preferences(payload),
      ActionKind::SyncDashboardConfig => Self::sync_dashboard_config(payload),
      ActionKind::MarkAlertRead | ActionKind::DismissAlert => {
        let alert_id = match &payload {
          Value::String(s) => s.as_str(),
          other => other
            .get("alertId")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(kind, "missing string field 'alertId'"))?,
        };
        if kind == ActionKind::MarkAlertRead {
          Self::mark_alert_read(alert_id)
        } else {
          Self::dismiss_alert(alert_id)
        }
      }
      ActionKind::SubmitFeedback => {
        let message = payload
          .get("message")
          .and_then(Value::as_str)
          .ok_or_else(|| invalid(kind, "missing string field 'message'"))?;
        let category = payload.get("category").and_then(Value::as_str);
        let rating = match payload.get("rating") {
          None | Some(Value::Null) => None,
          Some(v) => Some(
            v.as_u64()
              .and_then(|r| u8::try_from(r).ok())
              .ok_or_else(|| invalid(kind, "rating must be a small integer"))?,
          ),
        };
        Self::submit_feedback(message, category, rating)
      }
    }
  }

  pub fn kind(&self) -> ActionKind {
    match self {
      Self::UpdateSettings(_) => ActionKind::UpdateSettings,
      Self::MarkAlertRead(_) => ActionKind::MarkAlertRead,
      Self::DismissAlert(_) => ActionKind::DismissAlert,
      Self::UpdateNotificationPreferences(_) => ActionKind::UpdateNotificationPreferences,
      Self::SyncDashboardConfig(_) => ActionKind::SyncDashboardConfig,
      Self::SubmitFeedback(_) => ActionKind::SubmitFeedback,
    }
  }
}

/// A queued action awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  pub id: Uuid,
  pub action: Action,
  pub enqueued_at: DateTime<Utc>,
  /// Failed deliveries so far; never exceeds the configured retry bound
  pub attempt_count: u32,
}

impl PendingAction {
  pub fn new(action: Action, enqueued_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      action,
      enqueued_at,
      attempt_count: 0,
    }
  }

  pub fn kind(&self) -> ActionKind {
    self.action.kind()
  }
}

fn invalid(kind: ActionKind, reason: &str) -> ActionError {
  ActionError::InvalidPayload {
    kind,
    reason: reason.to_string(),
  }
}
