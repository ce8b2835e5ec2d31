use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub analytics: AnalyticsConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Collector base URL without a trailing slash
    pub base_url: String,
    pub website_id: String,
    /// Only ever read from the environment, never (de)serialized
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    /// Hostname reported in events. Falls back to the request's Host header.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Abandon tracking when no credentials are configured
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default = "AnalyticsConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "AnalyticsConfig::default_inject_script")]
    pub inject_script: bool,
    /// Existing page head-end markup the script tag is appended to
    #[serde(default)]
    pub head_end: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the wrapped application
    pub url: String,
}

impl AnalyticsConfig {
    const fn default_timeout_secs() -> u64 {
        10
    }

    const fn default_inject_script() -> bool {
        true
    }

    /// Build a config from explicit values, enforcing the same invariants as
    /// `Config::from_env`.
    pub fn new(base_url: &str, website_id: &str) -> TrackerResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let website_id = website_id.trim().to_string();

        if base_url.is_empty() {
            return Err(TrackerError::Configuration(
                "analytics base URL must not be empty".to_string(),
            ));
        }
        if website_id.is_empty() {
            return Err(TrackerError::Configuration(
                "analytics website id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            website_id,
            credentials: None,
            hostname: None,
            require_auth: false,
            timeout_secs: Self::default_timeout_secs(),
            inject_script: Self::default_inject_script(),
            head_end: None,
        })
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    fn from_env() -> TrackerResult<Self> {
        let base_url = non_empty_var("CKAN_UMAMI_ANALYTICS_URL").ok_or_else(|| {
            TrackerError::Configuration("CKAN_UMAMI_ANALYTICS_URL must be set".to_string())
        })?;
        let website_id = non_empty_var("CKAN_UMAMI_ANALYTICS_SITE_ID").ok_or_else(|| {
            TrackerError::Configuration("CKAN_UMAMI_ANALYTICS_SITE_ID must be set".to_string())
        })?;

        let mut analytics = Self::new(&base_url, &website_id)?;

        analytics.credentials = match (
            non_empty_var("CKAN_UMAMI_ANALYTICS_USERNAME"),
            non_empty_var("CKAN_UMAMI_ANALYTICS_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(TrackerError::Configuration(
                    "CKAN_UMAMI_ANALYTICS_USERNAME and CKAN_UMAMI_ANALYTICS_PASSWORD must be set together"
                        .to_string(),
                ))
            }
        };

        analytics.hostname = non_empty_var("CKAN_UMAMI_ANALYTICS_HOSTNAME").or_else(|| {
            non_empty_var("CKAN_SITE_URL").and_then(|site| hostname_from_url(&site))
        });

        analytics.require_auth = flag_var("CKAN_UMAMI_ANALYTICS_REQUIRE_AUTH").unwrap_or(false);
        analytics.inject_script = flag_var("CKAN_UMAMI_ANALYTICS_INJECT_SCRIPT")
            .unwrap_or_else(Self::default_inject_script);

        analytics.head_end = non_empty_var("CKAN_TEMPLATE_HEAD_END");

        if let Some(raw) = non_empty_var("CKAN_UMAMI_ANALYTICS_TIMEOUT_SECS") {
            analytics.timeout_secs = raw.parse::<u64>().map_err(|_| {
                TrackerError::Configuration(format!(
                    "CKAN_UMAMI_ANALYTICS_TIMEOUT_SECS must be a number of seconds, got '{raw}'"
                ))
            })?;
        }

        Ok(analytics)
    }
}

impl Config {
    pub fn from_env() -> TrackerResult<Self> {
        dotenvy::dotenv().ok();

        let analytics = AnalyticsConfig::from_env()?;

        let host = std::env::var("TRACKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port_raw = std::env::var("TRACKER_PORT").unwrap_or_else(|_| "8080".to_string());
        let port = port_raw.parse::<u16>().map_err(|_| {
            TrackerError::Configuration(format!("TRACKER_PORT must be a port number, got '{port_raw}'"))
        })?;

        let upstream_url = std::env::var("UPSTREAM_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            analytics,
            server: ServerConfig { host, port },
            upstream: UpstreamConfig { url: upstream_url },
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag_var(name: &str) -> Option<bool> {
    let value = non_empty_var(name)?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        other => {
            tracing::warn!("Unknown boolean '{other}' for {name}, ignoring");
            None
        }
    }
}

fn hostname_from_url(raw: &str) -> Option<String> {
    reqwest::Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}
