//! Sync configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_PUSHER_CLUSTER: &str = "us2";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Path of the private-channel auth endpoint, relative to the API base URL.
pub const REALTIME_AUTH_PATH: &str = "/pusher/auth";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(&'static str),
    #[error("config parse failed: {0}")]
    Parse(String),
}

impl ConfigError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingVar(_) => "E_CONFIG_MISSING",
            Self::Parse(_) => "E_CONFIG_PARSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Realtime (Pusher channels) connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    pub app_key: String,
    pub cluster: String,
    /// Full websocket URL, including app key and protocol query.
    pub socket_url: String,
    /// Private-channel auth endpoint.
    pub auth_endpoint: String,
}

impl RealtimeConfig {
    /// Settings for the hosted service in `cluster`.
    #[must_use]
    pub fn hosted(app_key: &str, cluster: &str, api_url: &str) -> Self {
        Self {
            app_key: app_key.to_owned(),
            cluster: cluster.to_owned(),
            socket_url: hosted_socket_url(app_key, cluster),
            auth_endpoint: format!("{api_url}{REALTIME_AUTH_PATH}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// REST base URL without trailing slash.
    pub api_url: String,
    pub timeouts: HttpTimeouts,
    pub realtime: RealtimeConfig,
    /// Snapshot polling interval while the realtime channel is unavailable.
    pub poll_interval: Duration,
}

impl SyncConfig {
    /// Build typed sync config from environment variables.
    ///
    /// Required:
    /// - `TASKFLOW_PUSHER_KEY`
    ///
    /// Optional:
    /// - `TASKFLOW_API_URL`: default `http://localhost:3001/api`
    /// - `TASKFLOW_PUSHER_CLUSTER`: default `us2`
    /// - `TASKFLOW_REALTIME_URL`: overrides the websocket URL derived from key and cluster
    /// - `TASKFLOW_REQUEST_TIMEOUT_SECS`: default 10
    /// - `TASKFLOW_CONNECT_TIMEOUT_SECS`: default 5
    /// - `TASKFLOW_POLL_INTERVAL_SECS`: default 15
    ///
    /// # Errors
    ///
    /// Returns an error if the app key is missing or a URL is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("TASKFLOW_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        check_url("TASKFLOW_API_URL", &api_url, &["http://", "https://"])?;

        let app_key = std::env::var("TASKFLOW_PUSHER_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingVar("TASKFLOW_PUSHER_KEY"))?;
        let cluster = std::env::var("TASKFLOW_PUSHER_CLUSTER").unwrap_or_else(|_| DEFAULT_PUSHER_CLUSTER.to_string());

        let mut realtime = RealtimeConfig::hosted(&app_key, &cluster, &api_url);
        if let Ok(url) = std::env::var("TASKFLOW_REALTIME_URL") {
            check_url("TASKFLOW_REALTIME_URL", &url, &["ws://", "wss://"])?;
            realtime.socket_url = url;
        }

        let timeouts = HttpTimeouts {
            request_secs: env_parse_u64("TASKFLOW_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("TASKFLOW_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let poll_interval =
            Duration::from_secs(env_parse_u64("TASKFLOW_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1));

        Ok(Self { api_url, timeouts, realtime, poll_interval })
    }
}

fn hosted_socket_url(app_key: &str, cluster: &str) -> String {
    format!(
        "wss://ws-{cluster}.pusher.com/app/{app_key}?protocol={}&client=taskflow-rs&version={}&flash=false",
        wire::protocol::PROTOCOL_VERSION,
        env!("CARGO_PKG_VERSION"),
    )
}

fn check_url(var: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::Parse(format!("{var} must start with one of {schemes:?}: {url}")))
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
