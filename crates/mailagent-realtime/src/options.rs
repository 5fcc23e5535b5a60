//! Session and per-request configuration.

use std::time::Duration;

use mailagent_core::RetryConfig;
use mailagent_settings::ClientSettings;
use tokio_util::sync::CancellationToken;

/// Static configuration of a [`RealtimeSession`](crate::RealtimeSession).
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Default per-request deadline.
    pub request_timeout: Duration,
    /// Backoff policy for the reconnect supervisor; `None` disables it.
    pub reconnect: Option<RetryConfig>,
}

impl SessionConfig {
    /// Derive from loaded client settings.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            url: settings.ws_url.clone(),
            connect_timeout: settings.realtime.connect_timeout(),
            request_timeout: settings.realtime.request_timeout(),
            reconnect: settings.realtime.reconnect.policy(),
        }
    }
}

/// What a request does when the socket is down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectMode {
    /// Wait for the supervisor (or a fresh attempt) to open a socket.
    #[default]
    WaitForReconnect,
    /// Fail with `NotConnected` unless a socket is open or opening.
    FailFast,
}

/// Per-request overrides.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Deadline override; the session default applies when `None`.
    pub timeout: Option<Duration>,
    /// Aborts the request when cancelled.
    pub cancel: Option<CancellationToken>,
    /// Behavior while disconnected.
    pub reconnect: ReconnectMode,
}

impl RequestOptions {
    /// Override the deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Do not wait through a reconnect.
    #[must_use]
    pub fn fail_fast(mut self) -> Self {
        self.reconnect = ReconnectMode::FailFast;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_default_settings() {
        let config = SessionConfig::from_settings(&ClientSettings::default());
        assert_eq!(config.url, "ws://localhost:8000/api");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.reconnect.is_some());
    }

    #[test]
    fn reconnect_disabled() {
        let mut settings = ClientSettings::default();
        settings.realtime.reconnect.enabled = false;
        assert!(SessionConfig::from_settings(&settings).reconnect.is_none());
    }

    #[test]
    fn builder() {
        let opts = RequestOptions::default()
            .with_timeout(Duration::from_millis(5))
            .fail_fast();
        assert_eq!(opts.timeout, Some(Duration::from_millis(5)));
        assert_eq!(opts.reconnect, ReconnectMode::FailFast);
        assert!(opts.cancel.is_none());
    }
}
