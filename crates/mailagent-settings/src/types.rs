//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every type has `#[serde(default)]`
//! so a settings file only needs the keys it overrides.

use std::time::Duration;

use mailagent_core::RetryConfig;
use serde::{Deserialize, Serialize};

/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/api";
/// Route the client navigates to when the session is rejected.
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Root client settings.
///
/// ```json
/// {
///   "apiUrl": "https://mail.example.com/api",
///   "realtime": { "requestTimeoutMs": 90000 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// REST base URL (all REST paths are appended to it).
    pub api_url: String,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Route used for the login redirect.
    pub login_route: String,
    /// Directory holding `auth.json`; `None` means `~/.mailagent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Realtime session tuning.
    pub realtime: RealtimeSettings,
    /// REST client tuning.
    pub http: HttpSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            data_dir: None,
            realtime: RealtimeSettings::default(),
            http: HttpSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Realtime session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Deadline for the WebSocket handshake.
    pub connect_timeout_ms: u64,
    /// Deadline for one request, including waiting for readiness.
    pub request_timeout_ms: u64,
    /// Reconnect supervisor settings.
    pub reconnect: ReconnectSettings,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 60_000,
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl RealtimeSettings {
    /// Handshake deadline as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Reconnect supervisor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Whether a dropped connection is re-established automatically.
    pub enabled: bool,
    /// Maximum reconnect attempts per drop.
    pub max_attempts: u32,
    /// Base backoff delay.
    pub base_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            enabled: true,
            max_attempts: retry.max_retries,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            jitter_factor: retry.jitter_factor,
        }
    }
}

impl ReconnectSettings {
    /// Backoff policy, or `None` when reconnects are disabled.
    pub fn policy(&self) -> Option<RetryConfig> {
        self.enabled.then(|| RetryConfig {
            max_retries: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_factor: self.jitter_factor,
        })
    }
}

/// REST client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("mailagent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`) or a full filter directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_client_env_defaults() {
        let s = ClientSettings::default();
        assert_eq!(s.api_url, "http://localhost:8000/api");
        assert_eq!(s.ws_url, "ws://localhost:8000/api");
        assert_eq!(s.login_route, "/login");
        assert_eq!(s.realtime.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn reconnect_policy_disabled() {
        let r = ReconnectSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(r.policy().is_none());
    }

    #[test]
    fn reconnect_policy_carries_values() {
        let r = ReconnectSettings {
            max_attempts: 2,
            base_delay_ms: 10,
            ..Default::default()
        };
        let p = r.policy().unwrap();
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.base_delay_ms, 10);
    }

    #[test]
    fn partial_json() {
        let s: ClientSettings =
            serde_json::from_str(r#"{"realtime": {"requestTimeoutMs": 5}}"#).unwrap();
        assert_eq!(s.realtime.request_timeout_ms, 5);
        assert_eq!(s.realtime.connect_timeout_ms, 10_000);
        assert_eq!(s.api_url, DEFAULT_API_URL);
    }
}
