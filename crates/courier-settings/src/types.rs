//! Settings type definitions.
//!
//! Field names are camelCase on the wire. Every struct is `#[serde(default)]`
//! so a partial file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Listener and per-connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl CourierSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be at least 1".into(),
            ));
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeatTimeoutMs ({}) is shorter than heartbeatIntervalMs ({})",
                s.heartbeat_timeout_ms, s.heartbeat_interval_ms
            )));
        }
        if s.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "maxMessageSize must be at least 1".into(),
            ));
        }
        if s.send_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "sendBuffer must be at least 1".into(),
            ));
        }
        if s.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        Ok(())
    }
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free one).
    pub port: u16,
    /// Interval between server Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection that has not answered a Ping for this long.
    pub heartbeat_timeout_ms: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound frames queued per connection before sends start failing.
    pub send_buffer: usize,
    /// Time allowed for connections to drain on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Shutdown drain timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 64 * 1024,
            send_buffer: 256,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Output format for the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
