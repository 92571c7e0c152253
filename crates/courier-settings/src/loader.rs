//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `COURIER_*` environment overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{CourierSettings, LogFormat};

/// Resolve the default settings file (`~/.courier/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply `COURIER_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`.
///
/// Numbers must parse and fall inside their range; anything invalid is
/// logged and ignored so the file/default value stays in effect.
pub fn apply_overrides(settings: &mut CourierSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("COURIER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_ranged(&read, "COURIER_PORT", parse_u16_range, 0, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = read_ranged(
        &read,
        "COURIER_HEARTBEAT_INTERVAL_MS",
        parse_u64_range,
        100,
        3_600_000,
    ) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_ranged(
        &read,
        "COURIER_HEARTBEAT_TIMEOUT_MS",
        parse_u64_range,
        100,
        86_400_000,
    ) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_ranged(
        &read,
        "COURIER_MAX_MESSAGE_SIZE",
        parse_usize_range,
        1,
        64 * 1024 * 1024,
    ) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = read_ranged(&read, "COURIER_SEND_BUFFER", parse_usize_range, 1, 1_000_000) {
        settings.server.send_buffer = v;
    }
    if let Some(v) = read_ranged(
        &read,
        "COURIER_SHUTDOWN_TIMEOUT_MS",
        parse_u64_range,
        0,
        600_000,
    ) {
        settings.server.shutdown_timeout_ms = v;
    }
    if let Some(v) = read("COURIER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("COURIER_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "COURIER_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

fn read_ranged<T: Copy>(
    read: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str, T, T) -> Option<T>,
    min: T,
    max: T,
) -> Option<T> {
    let val = read(key)?;
    let result = parse(val.trim(), min, max);
    if result.is_none() {
        warn!(key, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_lowercase().as_str() {
        "compact" | "text" | "pretty" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(serde_json::json!({"a": {"b": 1}}), serde_json::json!({"a": 5}));
        assert_eq!(merged["a"], 5);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s, CourierSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9443,"sendBuffer":32},"logging":{"level":"debug"}}"#,
        )
        .unwrap();

        let s = read_settings_file(&path).unwrap();
        assert_eq!(s.server.port, 9443);
        assert_eq!(s.server.send_buffer, 32);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.logging.level, "debug");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":"high"}}"#).unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"heartbeatIntervalMs":5000,"heartbeatTimeoutMs":1000}}"#,
        )
        .unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".courier/settings.json"));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = CourierSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("COURIER_HOST", "127.0.0.1"),
                ("COURIER_PORT", "9000"),
                ("COURIER_HEARTBEAT_INTERVAL_MS", "5000"),
                ("COURIER_HEARTBEAT_TIMEOUT_MS", "15000"),
                ("COURIER_MAX_MESSAGE_SIZE", "1024"),
                ("COURIER_SEND_BUFFER", "8"),
                ("COURIER_SHUTDOWN_TIMEOUT_MS", "0"),
                ("COURIER_LOG_LEVEL", "courier_core=debug"),
                ("COURIER_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.heartbeat_interval_ms, 5000);
        assert_eq!(s.server.heartbeat_timeout_ms, 15000);
        assert_eq!(s.server.max_message_size, 1024);
        assert_eq!(s.server.send_buffer, 8);
        assert_eq!(s.server.shutdown_timeout_ms, 0);
        assert_eq!(s.logging.level, "courier_core=debug");
        assert_eq!(s.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = CourierSettings::default();
        apply_overrides(
            &mut s,
            env(&[
                ("COURIER_PORT", "70000"),
                ("COURIER_SEND_BUFFER", "0"),
                ("COURIER_HEARTBEAT_INTERVAL_MS", "soon"),
                ("COURIER_LOG_FORMAT", "xml"),
                ("COURIER_HOST", "   "),
            ]),
        );
        assert_eq!(s, CourierSettings::default());
    }

    #[test]
    fn no_overrides_is_noop() {
        let mut s = CourierSettings::default();
        apply_overrides(&mut s, |_| None);
        assert_eq!(s, CourierSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("100", 100, 200), Some(100));
        assert_eq!(parse_u64_range("201", 100, 200), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("abc", 0, 10), None);
    }

    #[test]
    fn parse_log_formats() {
        assert_eq!(parse_log_format("json"), Some(LogFormat::Json));
        assert_eq!(parse_log_format(" Compact "), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
