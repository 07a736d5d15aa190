//! HttpActionExecutor against a local mock backend.

use serde_json::json;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use offsync::cache::ContentCache;
use offsync::network::NetworkMonitor;
use offsync::queue::{Action, ActionQueue, PendingAction};
use offsync::secrets::{FileSecretStore, SecretStore, TOKEN_KEY};
use offsync::storage::MemoryStorage;
use offsync::sync::{ActionExecutor, ExecutionError, HttpActionExecutor, SyncCoordinator};

struct Backend {
  server: MockServer,
  secrets: Arc<FileSecretStore>,
  _dir: tempfile::TempDir,
}

impl Backend {
  async fn start() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Arc::new(FileSecretStore::with_path(dir.path().join("secrets.yaml")));
    secrets.set(TOKEN_KEY, "test-token").unwrap();
    Self {
      server: MockServer::start().await,
      secrets,
      _dir: dir,
    }
  }

  fn executor(&self) -> HttpActionExecutor {
    let url = Url::parse(&self.server.uri()).unwrap();
    HttpActionExecutor::new(url, self.secrets.clone())
  }
}

fn pending(action: Action) -> PendingAction {
  PendingAction::new(action, chrono::Utc::now())
}

#[tokio::test]
async fn sends_bearer_token_and_json_body() {
  let backend = Backend::start().await;
  Mock::given(method("PUT"))
    .and(path("/api/user/settings"))
    .and(header("authorization", "Bearer test-token"))
    .and(body_json(json!({"theme": "dark"})))
    .respond_with(ResponseTemplate::new(204))
    .expect(1)
    .mount(&backend.server)
    .await;

  let action = pending(Action::update_settings(json!({"theme": "dark"})).unwrap());
  backend.executor().execute(&action).await.unwrap();
}

#[tokio::test]
async fn alert_actions_post_to_alert_path() {
  let backend = Backend::start().await;
  Mock::given(method("POST"))
    .and(path("/api/alerts/a1/read"))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&backend.server)
    .await;

  let action = pending(Action::mark_alert_read("a1").unwrap());
  backend.executor().execute(&action).await.unwrap();
}

#[tokio::test]
async fn non_2xx_is_a_retryable_status_error() {
  let backend = Backend::start().await;
  Mock::given(method("POST"))
    .and(path("/api/feedback"))
    .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
    .mount(&backend.server)
    .await;

  let action = pending(Action::submit_feedback("hello", None, None).unwrap());
  let err = backend.executor().execute(&action).await.unwrap_err();

  assert_eq!(
    err,
    ExecutionError::Status {
      status: 503,
      body: "maintenance".into()
    }
  );
  assert!(err.is_retryable());
}

#[tokio::test]
async fn missing_token_fails_without_a_request() {
  let backend = Backend::start().await;
  backend.secrets.delete(TOKEN_KEY).unwrap();
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(200))
    .expect(0)
    .mount(&backend.server)
    .await;

  let action = pending(Action::dismiss_alert("a1").unwrap());
  let err = backend.executor().execute(&action).await.unwrap_err();
  assert!(matches!(err, ExecutionError::Auth(_)));
}

#[tokio::test]
async fn rotated_token_is_used_for_queued_actions() {
  let backend = Backend::start().await;
  Mock::given(method("POST"))
    .and(header("authorization", "Bearer rotated"))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&backend.server)
    .await;

  let executor = backend.executor();
  let action = pending(Action::dismiss_alert("a1").unwrap());
  backend.secrets.set(TOKEN_KEY, "rotated").unwrap();

  executor.execute(&action).await.unwrap();
}

#[tokio::test]
async fn server_error_requeues_through_coordinator() {
  let backend = Backend::start().await;
  Mock::given(method("POST"))
    .and(path("/api/alerts/a1/dismiss"))
    .respond_with(ResponseTemplate::new(500))
    .mount(&backend.server)
    .await;

  let storage = Arc::new(MemoryStorage::new());
  let queue = Arc::new(ActionQueue::load(Arc::clone(&storage)).await);
  let cache = Arc::new(ContentCache::new(storage));
  let coordinator = SyncCoordinator::new(
    Arc::clone(&queue),
    cache,
    Arc::new(backend.executor()),
    NetworkMonitor::new(true),
  );

  queue.enqueue(Action::dismiss_alert("a1").unwrap()).await;
  let report = coordinator.drain().await;

  assert_eq!(report.retried, 1);
  assert_eq!(queue.pending()[0].attempt_count, 1);
}
