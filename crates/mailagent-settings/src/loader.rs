//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClientSettings::default()`]
//! 2. If `<home>/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate URL schemes
//!
//! Env lookups go through a closure so overrides can be exercised without
//! touching the process environment.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ClientSettings;

/// Settings file name inside the mailagent home directory.
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Resolve the mailagent home directory.
///
/// `MAILAGENT_HOME` wins; otherwise `~/.mailagent`.
pub fn home_dir() -> PathBuf {
    if let Some(home) = read_env_string(&process_env, "MAILAGENT_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mailagent")
}

/// Resolve the path to the settings file.
pub fn settings_path() -> PathBuf {
    home_dir().join(SETTINGS_FILE_NAME)
}

/// Resolve the data directory configured in `settings`.
pub fn data_dir(settings: &ClientSettings) -> PathBuf {
    settings
        .data_dir
        .as_ref()
        .map_or_else(home_dir, PathBuf::from)
}

/// Load settings from the default path with process env overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with process env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    load_settings_with_env(path, &process_env)
}

/// Load settings from `path`, resolving env overrides through `env`.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_with_env(
    path: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ClientSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides.
///
/// `MAILAGENT_*` names take precedence over the `VITE_*` names the web
/// client used. Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut ClientSettings, env: &dyn Fn(&str) -> Option<String>) {
    // ── Endpoints ───────────────────────────────────────────────────
    if let Some(v) =
        read_env_string(env, "MAILAGENT_API_URL").or_else(|| read_env_string(env, "VITE_API_URL"))
    {
        settings.api_url = v;
    }
    if let Some(v) =
        read_env_string(env, "MAILAGENT_WS_URL").or_else(|| read_env_string(env, "VITE_WS_URL"))
    {
        settings.ws_url = v;
    }
    if let Some(v) = read_env_string(env, "MAILAGENT_DATA_DIR") {
        settings.data_dir = Some(v);
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64(env, "MAILAGENT_REQUEST_TIMEOUT_MS", 100, 3_600_000) {
        settings.realtime.request_timeout_ms = v;
    }
    if let Some(v) = read_env_u64(env, "MAILAGENT_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.realtime.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_bool(env, "MAILAGENT_RECONNECT") {
        settings.realtime.reconnect.enabled = v;
    }
    if let Some(v) = read_env_u32(env, "MAILAGENT_RECONNECT_ATTEMPTS", 0, 100) {
        settings.realtime.reconnect.max_attempts = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string(env, "MAILAGENT_LOG") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool(env, "MAILAGENT_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject endpoints with the wrong scheme.
pub fn validate(settings: &ClientSettings) -> Result<()> {
    if !(settings.api_url.starts_with("http://") || settings.api_url.starts_with("https://")) {
        return Err(SettingsError::InvalidValue(format!(
            "apiUrl must be http(s): {}",
            settings.api_url
        )));
    }
    if !(settings.ws_url.starts_with("ws://") || settings.ws_url.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "wsUrl must be ws(s): {}",
            settings.ws_url
        )));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn read_env_string(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    env(name).filter(|v| !v.is_empty())
}

fn read_env_bool(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = env(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: u64,
    max: u64,
) -> Option<u64> {
    let val = env(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

fn read_env_u32(
    env: &dyn Fn(&str) -> Option<String>,
    name: &str,
    min: u32,
    max: u32,
) -> Option<u32> {
    read_env_u64(env, name, u64::from(min), u64::from(max)).and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_with_env(&dir.path().join("nope.json"), &env_from(&[])).unwrap();
        assert_eq!(s, ClientSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"apiUrl": "https://mail.example.com/api", "realtime": {"reconnect": {"maxAttempts": 9}}}"#,
        )
        .unwrap();
        let s = load_settings_with_env(&path, &env_from(&[])).unwrap();
        assert_eq!(s.api_url, "https://mail.example.com/api");
        assert_eq!(s.realtime.reconnect.max_attempts, 9);
        assert!(s.realtime.reconnect.enabled);
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"wsUrl": "ws://file:1/api"}"#).unwrap();
        let env = env_from(&[
            ("VITE_WS_URL", "wss://vite.example.com/api"),
            ("MAILAGENT_REQUEST_TIMEOUT_MS", "2500"),
            ("MAILAGENT_RECONNECT", "off"),
        ]);
        let s = load_settings_with_env(&path, &env).unwrap();
        assert_eq!(s.ws_url, "wss://vite.example.com/api");
        assert_eq!(s.realtime.request_timeout_ms, 2500);
        assert!(!s.realtime.reconnect.enabled);
    }

    #[test]
    fn mailagent_names_beat_vite_names() {
        let mut s = ClientSettings::default();
        let env = env_from(&[
            ("VITE_API_URL", "http://vite/api"),
            ("MAILAGENT_API_URL", "http://native/api"),
        ]);
        apply_env_overrides(&mut s, &env);
        assert_eq!(s.api_url, "http://native/api");
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut s = ClientSettings::default();
        let env = env_from(&[
            ("MAILAGENT_REQUEST_TIMEOUT_MS", "soon"),
            ("MAILAGENT_RECONNECT", "maybe"),
            ("MAILAGENT_API_URL", ""),
        ]);
        apply_env_overrides(&mut s, &env);
        assert_eq!(s, ClientSettings::default());
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{oops").unwrap();
        let err = load_settings_with_env(&path, &env_from(&[])).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn wrong_scheme_rejected() {
        let env = env_from(&[("MAILAGENT_WS_URL", "http://not-a-socket")]);
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_with_env(&dir.path().join("x.json"), &env).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn deep_merge_skips_nulls_and_replaces_arrays() {
        let target = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": 4});
        let source = serde_json::json!({"a": {"c": [3]}, "d": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"]["b"], 1);
        assert_eq!(merged["a"]["c"], serde_json::json!([3]));
        assert_eq!(merged["d"], 4);
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("sure"), None);
    }

    #[test]
    fn data_dir_prefers_setting() {
        let s = ClientSettings {
            data_dir: Some("/var/lib/mailagent".into()),
            ..Default::default()
        };
        assert_eq!(data_dir(&s), PathBuf::from("/var/lib/mailagent"));
    }
}
