//! HTTP reachability probe producing raw connectivity observations.

use futures::Stream;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Polls a health endpoint and reports whether the backend answered.
///
/// Any HTTP response counts as connected: the question is reachability, not
/// health. Only transport failures and timeouts count as disconnected.
#[derive(Debug, Clone)]
pub struct HttpProbe {
  client: Client,
  url: Url,
  interval: Duration,
}

impl HttpProbe {
  pub fn new(url: Url, interval: Duration) -> Self {
    let client = Client::builder()
      .timeout(interval.min(Duration::from_secs(10)))
      .build()
      .unwrap_or_default();
    Self {
      client,
      url,
      interval,
    }
  }

  /// One observation.
  pub async fn check(&self) -> bool {
    match self.client.head(self.url.clone()).send().await {
      Ok(response) => {
        debug!(status = %response.status(), "probe answered");
        true
      }
      Err(e) => {
        debug!(error = %e, "probe failed");
        false
      }
    }
  }

  /// Endless stream of observations, the first one immediately.
  pub fn into_stream(self) -> impl Stream<Item = bool> + Send + 'static {
    futures::stream::unfold((self, true), |(probe, first)| async move {
      if !first {
        tokio::time::sleep(probe.interval).await;
      }
      let connected = probe.check().await;
      Some((connected, (probe, false)))
    })
  }
}
