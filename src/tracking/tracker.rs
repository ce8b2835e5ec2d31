use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::USER_AGENT, Client};
use tracing::{debug, error, info, warn};

use super::models::{DownloadEvent, DownloadIds, DownloadRequest, TrackingOutcome};
use super::path::{extract_download_ids, matches_download_path};
use crate::auth::TokenManager;
use crate::config::AnalyticsConfig;
use crate::error::{TrackerError, TrackerResult};

/// Reports resource downloads to the analytics collector.
///
/// Tracking never fails from the caller's point of view: every error is logged
/// and folded into [`TrackingOutcome::Failed`].
pub struct DownloadTracker {
    client: Client,
    config: AnalyticsConfig,
    tokens: Arc<TokenManager>,
}

impl DownloadTracker {
    /// Build a tracker with its own HTTP client and token manager.
    pub fn from_config(config: &AnalyticsConfig) -> TrackerResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("umami-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let tokens = Arc::new(TokenManager::new(
            client.clone(),
            &config.base_url,
            config.credentials.clone(),
        ));

        Ok(Self::new(client, config.clone(), tokens))
    }

    pub fn new(client: Client, config: AnalyticsConfig, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Track `request` if it is a download, otherwise do nothing.
    pub async fn handle_request(&self, request: &DownloadRequest) -> TrackingOutcome {
        if !matches_download_path(&request.path) {
            return TrackingOutcome::NotApplicable;
        }
        self.track_download(request).await
    }

    /// Send a download event for `request`, suppressing every failure.
    pub async fn track_download(&self, request: &DownloadRequest) -> TrackingOutcome {
        match self.send_download_event(request).await {
            Ok(ids) => {
                info!(
                    dataset_id = %ids.dataset_id,
                    resource_id = %ids.resource_id,
                    "Tracked resource download"
                );
                TrackingOutcome::Sent
            }
            Err(err @ TrackerError::MalformedPath { .. }) => {
                warn!(path = %request.path, error = %err, "Skipping download tracking");
                TrackingOutcome::Failed
            }
            Err(err) => {
                error!(path = %request.path, error = %err, "Failed to track resource download");
                TrackingOutcome::Failed
            }
        }
    }

    async fn send_download_event(&self, request: &DownloadRequest) -> TrackerResult<DownloadIds> {
        let ids = extract_download_ids(&request.path)?;
        let event = self.build_event(request, ids);
        let token = self.bearer_token().await?;

        let mut builder = self
            .client
            .post(format!("{}/api/send", self.config.base_url))
            .json(&event.to_body());
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(status = status.as_u16(), "Analytics collector accepted event");
        Ok(event.ids)
    }

    fn build_event(&self, request: &DownloadRequest, ids: DownloadIds) -> DownloadEvent {
        let hostname = self
            .config
            .hostname
            .clone()
            .or_else(|| request.host.clone())
            .unwrap_or_default();

        DownloadEvent {
            hostname,
            url: request.path.clone(),
            website_id: self.config.website_id.clone(),
            ids,
        }
    }

    /// `None` means the event goes out unauthenticated.
    async fn bearer_token(&self) -> TrackerResult<Option<String>> {
        if self.tokens.has_credentials() {
            return self.tokens.ensure_valid_token().await.map(Some);
        }
        if self.config.require_auth {
            return Err(TrackerError::Configuration(
                "analytics credentials are not configured".to_string(),
            ));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn download(path: &str) -> DownloadRequest {
        DownloadRequest {
            path: path.to_string(),
            host: Some("portal.example".to_string()),
            user_agent: Some("Mozilla/5.0 (test)".to_string()),
        }
    }

    fn tracker(server: &MockServer) -> DownloadTracker {
        let config = AnalyticsConfig::new(&server.uri(), "site1").unwrap();
        DownloadTracker::from_config(&config).unwrap()
    }

    /// Log sink shared between the subscriber and the assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            let sink = self.clone();
            tracing_subscriber::fmt()
                .with_writer(move || sink.clone())
                .with_ansi(false)
                .finish()
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn rejected_event_is_logged_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let outcome = tracker(&server)
            .handle_request(&download("/dataset/d1/resource/r1/download/f.csv"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Failed);

        let output = logs.contents();
        let line = output
            .lines()
            .find(|line| line.contains("Failed to track resource download"))
            .unwrap_or_else(|| panic!("no error line in:\n{output}"));
        assert!(line.contains("ERROR"));
        assert!(line.contains("/dataset/d1/resource/r1/download/f.csv"));
        assert!(line.contains("400"));
    }

    #[tokio::test]
    async fn malformed_path_is_logged_as_warning() {
        let server = MockServer::start().await;

        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let outcome = tracker(&server)
            .handle_request(&download("/dataset/a/download/b/resource/c"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Failed);

        let output = logs.contents();
        let line = output
            .lines()
            .find(|line| line.contains("Skipping download tracking"))
            .unwrap_or_else(|| panic!("no warning line in:\n{output}"));
        assert!(line.contains("WARN"));
        assert!(line.contains("/dataset/a/download/b/resource/c"));
        assert!(!output.contains("ERROR"));
    }

    #[tokio::test]
    async fn non_download_paths_are_not_applicable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = tracker(&server).handle_request(&download("/dataset/abc")).await;
        assert_eq!(outcome, TrackingOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn host_header_is_used_when_no_hostname_is_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .and(header("user-agent", "Mozilla/5.0 (test)"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = tracker(&server);
        let outcome = tracker
            .handle_request(&download("/dataset/d1/resource/r1/download/f.csv"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Sent);

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["payload"]["hostname"], "portal.example");
    }

    #[tokio::test]
    async fn configured_hostname_wins_over_host_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = AnalyticsConfig::new(&server.uri(), "site1")
            .unwrap()
            .with_hostname("data.example.org");
        let tracker = DownloadTracker::from_config(&config).unwrap();
        tracker
            .handle_request(&download("/dataset/d1/resource/r1/download/f.csv"))
            .await;

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["payload"]["hostname"], "data.example.org");
    }

    #[tokio::test]
    async fn collector_rejection_is_suppressed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = tracker(&server)
            .handle_request(&download("/dataset/d1/resource/r1/download/f.csv"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Failed);
    }

    #[tokio::test]
    async fn misplaced_markers_fail_without_contacting_collector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = tracker(&server)
            .handle_request(&download("/dataset/a/download/b/resource/c"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Failed);
    }

    #[tokio::test]
    async fn require_auth_without_credentials_abandons_tracking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = AnalyticsConfig::new(&server.uri(), "site1").unwrap();
        config.require_auth = true;
        let tracker = DownloadTracker::from_config(&config).unwrap();

        let outcome = tracker
            .handle_request(&download("/dataset/d1/resource/r1/download/f.csv"))
            .await;
        assert_eq!(outcome, TrackingOutcome::Failed);
    }
}
