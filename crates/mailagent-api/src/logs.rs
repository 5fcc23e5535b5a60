//! Backend activity logs (`/logs`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::de::{id_string, null_default};
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// Default number of entries per query.
pub const DEFAULT_LOG_LIMIT: u32 = 100;
/// Largest page the backend serves.
pub const MAX_LOG_LIMIT: u32 = 1000;
/// Default retention for [`LogsClient::cleanup`].
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant),+
        }

        impl $name {
            /// Wire string.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.eq_ignore_ascii_case($wire) {
                    return Ok(Self::$variant);
                })+
                Err(format!("unknown {}: {s}", stringify!($name)))
            }
        }
    };
}

wire_enum!(
    /// Severity of a log entry.
    LogLevel {
        /// Debug.
        Debug => "DEBUG",
        /// Info.
        Info => "INFO",
        /// Warning.
        Warning => "WARNING",
        /// Error.
        Error => "ERROR",
        /// Critical.
        Critical => "CRITICAL",
    }
);

wire_enum!(
    /// Subsystem that wrote a log entry.
    LogCategory {
        /// Uncategorized.
        General => "GENERAL",
        /// REST API.
        Api => "API",
        /// Realtime socket.
        WebSocket => "WEBSOCKET",
        /// Mail delivery.
        Email => "EMAIL",
        /// Model calls.
        Llm => "LLM",
        /// Authentication.
        Auth => "AUTH",
        /// Storage.
        Database => "DATABASE",
    }
);

/// One log entry. Level and category stay strings so entries parsed from
/// the backend's file fallback decode even when they carry other values.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct LogEntry {
    /// Row ID.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// ISO-8601 time.
    pub timestamp: String,
    /// Severity.
    pub level: String,
    /// Subsystem.
    #[serde(default, deserialize_with = "null_default")]
    pub category: String,
    /// Log line.
    pub message: String,
    /// Structured extras.
    #[serde(default)]
    pub details: Option<Value>,
    /// Logger name.
    #[serde(default)]
    pub source: Option<String>,
    /// Acting user.
    #[serde(default)]
    pub user_id: Option<Value>,
    /// Session, when known.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Client IP.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Client user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// ISO-8601 insert time.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Filters for [`LogsClient::query`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilters {
    /// Minimum severity.
    pub level: Option<LogLevel>,
    /// Subsystem.
    pub category: Option<LogCategory>,
    /// Substring search over messages.
    pub search_term: Option<String>,
    /// Page size; defaults to 100, capped at 1000.
    pub limit: Option<u32>,
    /// Entries to skip.
    pub offset: Option<u32>,
    /// ISO-8601 lower bound.
    pub start_date: Option<String>,
    /// ISO-8601 upper bound.
    pub end_date: Option<String>,
}

impl LogFilters {
    /// Query pairs, with `limit` always present.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(level) = self.level {
            pairs.push(("level", level.to_string()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.to_string()));
        }
        if let Some(term) = self.search_term.as_deref().filter(|t| !t.is_empty()) {
            pairs.push(("search_term", term.to_owned()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
        pairs.push(("limit", limit.to_string()));
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(start) = &self.start_date {
            pairs.push(("start_date", start.clone()));
        }
        if let Some(end) = &self.end_date {
            pairs.push(("end_date", end.clone()));
        }
        pairs
    }
}

/// Per-level counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogStats {
    /// All entries.
    pub total_logs: u64,
    /// `ERROR` entries.
    pub error_count: u64,
    /// `WARNING` entries.
    pub warning_count: u64,
    /// `INFO` entries.
    pub info_count: u64,
    /// `DEBUG` entries.
    pub debug_count: u64,
    /// `CRITICAL` entries.
    pub critical_count: u64,
    /// Entries per category.
    pub category_breakdown: BTreeMap<String, u64>,
}

/// Health of the backend's logging pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LogStatus {
    /// Entries are written to the database.
    pub database_available: bool,
    /// Entries are written to the log file.
    pub file_logging: bool,
    /// Why the database is unavailable.
    #[serde(default)]
    pub database_error: Option<String>,
}

impl LogStatus {
    /// Reported when the backend cannot be reached.
    pub fn unreachable() -> Self {
        Self {
            database_available: false,
            file_logging: true,
            database_error: Some("Could not connect to server".into()),
        }
    }
}

/// Reply to a cleanup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CleanupResult {
    /// Backend success flag.
    pub success: bool,
    /// Entries removed.
    pub deleted_count: u64,
    /// Status text.
    pub message: String,
}

/// Client for `/logs`.
#[derive(Clone, Copy, Debug)]
pub struct LogsClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> LogsClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    /// Entries matching `filters`, newest first.
    pub async fn query(&self, filters: &LogFilters) -> Result<Vec<LogEntry>, ApiError> {
        let call = filters
            .to_query()
            .into_iter()
            .fold(Call::get("/logs"), |call, (key, value)| call.query(key, value));
        self.http.fetch(call).await
    }

    /// Counters by level and category.
    pub async fn stats(&self) -> Result<LogStats, ApiError> {
        self.http.get_json("/logs/stats").await
    }

    /// Logging pipeline health. Falls back to [`LogStatus::unreachable`]
    /// when the backend cannot answer; an expired session still errors.
    pub async fn status(&self) -> Result<LogStatus, ApiError> {
        match self.http.get_json("/logs/status").await {
            Ok(status) => Ok(status),
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized),
            Err(e) => {
                warn!(error = %e, "log status unavailable");
                Ok(LogStatus::unreachable())
            }
        }
    }

    /// Delete entries older than `days` (1..=365).
    pub async fn cleanup(&self, days: u32) -> Result<CleanupResult, ApiError> {
        if !(1..=365).contains(&days) {
            return Err(ApiError::Invalid(format!("days must be within 1..=365, got {days}")));
        }
        let result: CleanupResult = self
            .http
            .fetch(Call::delete("/logs/cleanup").query("days", days))
            .await?;
        if !result.success {
            return Err(ApiError::Status {
                status: 200,
                message: if result.message.is_empty() {
                    "Failed to cleanup logs".into()
                } else {
                    result.message
                },
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::fixture;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    #[test]
    fn filters_default_limit() {
        let q = LogFilters::default().to_query();
        assert_eq!(q, vec![("limit", "100".to_string())]);
    }

    #[test]
    fn filters_full_query() {
        let filters = LogFilters {
            level: Some(LogLevel::Error),
            category: Some(LogCategory::WebSocket),
            search_term: Some("timeout".into()),
            limit: Some(5000),
            offset: Some(20),
            ..Default::default()
        };
        let q = filters.to_query();
        assert!(q.contains(&("level", "ERROR".into())));
        assert!(q.contains(&("category", "WEBSOCKET".into())));
        assert!(q.contains(&("search_term", "timeout".into())));
        assert!(q.contains(&("limit", "1000".into())));
        assert!(q.contains(&("offset", "20".into())));
    }

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("llm".parse::<LogCategory>().unwrap(), LogCategory::Llm);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[tokio::test]
    async fn query_sends_filters() {
        let f = fixture(None).await;
        Mock::given(method("GET"))
            .and(path("/api/logs"))
            .and(query_param("level", "ERROR"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 1,
                "timestamp": "2024-05-01T10:00:00",
                "level": "ERROR",
                "category": "WEBSOCKET",
                "message": "socket closed",
                "details": {"code": 1006},
                "source": "ws",
                "user_id": null,
                "session_id": null,
                "ip_address": null,
                "user_agent": null,
                "created_at": "2024-05-01T10:00:00"
            }])))
            .expect(1)
            .mount(&f.server)
            .await;

        let filters = LogFilters {
            level: Some(LogLevel::Error),
            ..Default::default()
        };
        let logs = LogsClient::new(&f.http).query(&filters).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details.as_ref().unwrap()["code"], 1006);
    }

    #[tokio::test]
    async fn stats_decode() {
        let f = fixture(None).await;
        Mock::given(method("GET"))
            .and(path("/api/logs/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_logs": 3,
                "error_count": 1,
                "warning_count": 0,
                "info_count": 2,
                "debug_count": 0,
                "critical_count": 0,
                "category_breakdown": {"API": 2, "AUTH": 1}
            })))
            .mount(&f.server)
            .await;

        let stats = LogsClient::new(&f.http).stats().await.unwrap();
        assert_eq!(stats.total_logs, 3);
        assert_eq!(stats.category_breakdown.get("API"), Some(&2));
    }

    #[tokio::test]
    async fn status_falls_back_on_server_error() {
        let f = fixture(None).await;
        Mock::given(method("GET"))
            .and(path("/api/logs/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&f.server)
            .await;

        let status = LogsClient::new(&f.http).status().await.unwrap();
        assert_eq!(status, LogStatus::unreachable());
    }

    #[tokio::test]
    async fn cleanup_validates_and_sends_days() {
        let f = fixture(None).await;
        Mock::given(method("DELETE"))
            .and(path("/api/logs/cleanup"))
            .and(query_param("days", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "deleted_count": 12,
                "message": "Deleted 12 log entries older than 30 days"
            })))
            .expect(1)
            .mount(&f.server)
            .await;

        let client = LogsClient::new(&f.http);
        assert_matches!(client.cleanup(0).await, Err(ApiError::Invalid(_)));
        assert_matches!(client.cleanup(366).await, Err(ApiError::Invalid(_)));
        assert_eq!(client.cleanup(DEFAULT_RETENTION_DAYS).await.unwrap().deleted_count, 12);
    }

    #[tokio::test]
    async fn cleanup_failure_flag_is_error() {
        let f = fixture(None).await;
        Mock::given(method("DELETE"))
            .and(path("/api/logs/cleanup"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Failed to cleanup logs"})),
            )
            .mount(&f.server)
            .await;

        let err = LogsClient::new(&f.http).cleanup(7).await.unwrap_err();
        assert_matches!(err, ApiError::Status { ref message, .. } if message == "Failed to cleanup logs");
    }
}
