//! Delivery of a single pending action to the backend.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::queue::{Action, ActionKind, PendingAction};
use crate::secrets::{SecretStore, TOKEN_KEY};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("offsync/", env!("CARGO_PKG_VERSION"));

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 200;

/// Why an action was not delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
  /// The request never got a response.
  #[error("transport error: {0}")]
  Transport(String),

  /// The backend answered with a non-2xx status.
  #[error("backend returned {status}: {body}")]
  Status { status: u16, body: String },

  /// No usable bearer token.
  #[error("authentication unavailable: {0}")]
  Auth(String),

  /// This executor has no mapping for the action kind.
  #[error("unsupported action kind: {0}")]
  Unsupported(ActionKind),
}

impl ExecutionError {
  /// Retrying cannot fix an unsupported kind; everything else may succeed
  /// on a later attempt.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, ExecutionError::Unsupported(_))
  }
}

/// Delivers pending actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
  /// `Ok` only when the backend accepted the action.
  async fn execute(&self, action: &PendingAction) -> Result<(), ExecutionError>;
}

/// The HTTP call that delivers an action.
///
/// The path is kept as raw segments; each one is percent-encoded on its own
/// when appended to the base URL, so an alert id always stays one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  pub segments: Vec<String>,
  pub body: Option<Value>,
}

impl ApiRequest {
  /// Map an action to its endpoint.
  pub fn for_action(action: &Action) -> Self {
    match action {
      Action::UpdateSettings(settings) => Self::put(&["api", "user", "settings"], settings.as_map()),
      Action::MarkAlertRead(alert) => Self::alert(alert.alert_id(), "read"),
      Action::DismissAlert(alert) => Self::alert(alert.alert_id(), "dismiss"),
      Action::UpdateNotificationPreferences(prefs) => {
        Self::put(&["api", "user", "notification-preferences"], prefs.as_map())
      }
      Action::SyncDashboardConfig(config) => {
        Self::put(&["api", "dashboard", "config"], config.as_map())
      }
      Action::SubmitFeedback(feedback) => Self {
        method: Method::POST,
        segments: segments(&["api", "feedback"]),
        body: serde_json::to_value(feedback).ok(),
      },
    }
  }

  /// Unencoded path for display, e.g. `/api/alerts/a1/read`.
  pub fn path(&self) -> String {
    format!("/{}", self.segments.join("/"))
  }

  /// Append the segments to `base`, keeping any path prefix it has.
  pub fn url(&self, base: &Url) -> Result<Url, ExecutionError> {
    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ExecutionError::Transport(format!("base URL {} cannot carry a path", base)))?
      .pop_if_empty()
      .extend(&self.segments);
    Ok(url)
  }

  fn alert(alert_id: &str, verb: &str) -> Self {
    Self {
      method: Method::POST,
      segments: vec!["api".into(), "alerts".into(), alert_id.to_string(), verb.into()],
      body: None,
    }
  }

  fn put(path: &[&str], body: &serde_json::Map<String, Value>) -> Self {
    Self {
      method: Method::PUT,
      segments: segments(path),
      body: Some(Value::Object(body.clone())),
    }
  }
}

fn segments(path: &[&str]) -> Vec<String> {
  path.iter().map(|s| s.to_string()).collect()
}

/// Executor that calls the backend REST API.
///
/// The bearer token is read from the secret store on every call so that a
/// token rotated after an action was queued is still used.
pub struct HttpActionExecutor {
  client: Client,
  base_url: Url,
  secrets: Arc<dyn SecretStore>,
}

// Custom Debug so the secret store never shows up in logs
impl std::fmt::Debug for HttpActionExecutor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HttpActionExecutor")
      .field("base_url", &self.base_url.as_str())
      .finish()
  }
}

impl HttpActionExecutor {
  pub fn new(base_url: Url, secrets: Arc<dyn SecretStore>) -> Self {
    Self::with_client(Client::new(), base_url, secrets)
  }

  pub fn with_client(client: Client, base_url: Url, secrets: Arc<dyn SecretStore>) -> Self {
    Self {
      client,
      base_url,
      secrets,
    }
  }

  fn bearer_token(&self) -> Result<HeaderValue, ExecutionError> {
    let token = self
      .secrets
      .get(TOKEN_KEY)
      .map_err(|e| ExecutionError::Auth(e.to_string()))?
      .ok_or_else(|| ExecutionError::Auth("no API token stored".into()))?;

    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
      .map_err(|_| ExecutionError::Auth("stored API token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
  }

}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
  async fn execute(&self, action: &PendingAction) -> Result<(), ExecutionError> {
    let request = ApiRequest::for_action(&action.action);
    let url = request.url(&self.base_url)?;
    let token = self.bearer_token()?;

    debug!(id = %action.id, kind = %action.kind(), method = %request.method, %url, "executing action");

    let mut builder = self
      .client
      .request(request.method, url)
      .header(AUTHORIZATION, token)
      .header(USER_AGENT, USER_AGENT_VALUE);
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| ExecutionError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(());
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
      let mut cut = MAX_ERROR_BODY;
      while !body.is_char_boundary(cut) {
        cut -= 1;
      }
      body.truncate(cut);
    }

    Err(ExecutionError::Status {
      status: status.as_u16(),
      body,
    })
  }
}
