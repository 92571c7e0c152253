//! Server configuration.

use std::time::Duration;

use courier_settings::ServerSettings;

/// Runtime configuration for [`crate::RelayServer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Close a connection whose last Pong is older than this.
    pub heartbeat_timeout: Duration,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_buffer: usize,
    /// How long shutdown waits for tasks and connections to drain.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_timeout: settings.heartbeat_timeout(),
            max_message_size: settings.max_message_size,
            send_buffer: settings.send_buffer,
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }

    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loopback on an ephemeral port; everything else from settings defaults.
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from_settings(&ServerSettings::default())
        }
    }
}
