use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::{TrackerError, TrackerResult};

/// Holds the bearer token used against the analytics collector.
///
/// The token lives only in memory. It is fetched on first use and replaced
/// whenever the collector stops accepting it; `ensure_valid_token` is the only
/// way it changes.
pub struct TokenManager {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    token: Mutex<Option<String>>,
}

impl TokenManager {
    pub fn new(client: Client, base_url: &str, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Return a token the collector currently accepts, logging in at most once.
    pub async fn ensure_valid_token(&self) -> TrackerResult<String> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            TrackerError::Configuration(
                "analytics credentials are required to obtain a token".to_string(),
            )
        })?;

        // Held across the login so concurrent callers share one exchange.
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_deref() {
            if self.is_token_valid(token).await? {
                return Ok(token.to_string());
            }
            debug!("Cached analytics token was rejected, logging in again");
        }

        let token = self.obtain_token(credentials).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Exchange credentials for a fresh token.
    pub async fn obtain_token(&self, credentials: &Credentials) -> TrackerResult<String> {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        let body: LoginResponse = response.json().await.map_err(|e| {
            TrackerError::Authentication(format!(
                "login response (status {status}) was not valid JSON: {e}"
            ))
        })?;

        let token = body.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            TrackerError::Authentication(format!(
                "login response (status {status}) did not contain a token"
            ))
        })?;

        info!(username = %credentials.username, "Obtained analytics token");
        Ok(token)
    }

    /// Ask the collector whether `token` is still accepted.
    ///
    /// Any status other than 200 means "no"; only network failures are errors.
    pub async fn is_token_valid(&self, token: &str) -> TrackerResult<bool> {
        let response = self
            .client
            .get(format!("{}/api/auth/verify", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        let valid = response.status() == StatusCode::OK;
        if !valid {
            debug!(status = response.status().as_u16(), "Analytics token failed verification");
        }
        Ok(valid)
    }

    #[cfg(test)]
    pub(crate) async fn cached_token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(server: &MockServer) -> TokenManager {
        TokenManager::new(
            Client::new(),
            &server.uri(),
            Some(Credentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
        )
    }

    #[tokio::test]
    async fn first_call_logs_in_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({"username": "admin", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "t1");
        assert_eq!(tokens.cached_token().await.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn valid_cached_token_skips_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify"))
            .and(header("authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        for _ in 0..3 {
            assert_eq!(tokens.ensure_valid_token().await.unwrap(), "t1");
        }
    }

    #[tokio::test]
    async fn rejected_token_is_replaced_after_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = manager(&server);
        *tokens.token.lock().await = Some("stale".to_string());

        assert_eq!(tokens.ensure_valid_token().await.unwrap(), "t2");
        assert_eq!(tokens.cached_token().await.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn login_without_token_field_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "nope"})))
            .mount(&server)
            .await;

        let tokens = manager(&server);
        let err = tokens.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, TrackerError::Authentication(_)));
        assert!(tokens.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn verify_non_200_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/verify"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tokens = manager(&server);
        assert!(!tokens.is_token_valid("whatever").await.unwrap());
    }

    #[tokio::test]
    async fn missing_credentials_never_attempt_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = TokenManager::new(Client::new(), &server.uri(), None);
        let err = tokens.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, TrackerError::Configuration(_)));
    }

    #[tokio::test]
    async fn unreachable_collector_is_a_transport_error() {
        // Nothing listens on port 9 of localhost in the test environment.
        let tokens = TokenManager::new(
            Client::new(),
            "http://127.0.0.1:9",
            Some(Credentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
        );
        let err = tokens.ensure_valid_token().await.unwrap_err();
        assert!(matches!(err, TrackerError::Transport(_)));
    }
}
