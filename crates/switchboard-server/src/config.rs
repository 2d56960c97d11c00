//! Server configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::errors::{ConfigError, Result};
use crate::websocket::heartbeat::HeartbeatConfig;

/// Runtime configuration for the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = OS-assigned).
    pub port: u16,
    /// Outbound frames buffered per client before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Seconds between pings; 0 disables the heartbeat entirely.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a client is closed.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for sessions to drain on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Default log level (`trace` .. `error`).
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
    /// Record Prometheus metrics and serve them on `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            send_queue_capacity: 256,
            max_message_size: 1024 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
            log_level: "info".into(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `None` when the heartbeat is disabled.
    pub fn heartbeat(&self) -> Option<HeartbeatConfig> {
        (self.heartbeat_interval_secs > 0).then(|| HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat_interval_secs),
            timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        })
    }

    /// Drain budget for graceful shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Parsed `log_level`, case-insensitive.
    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidValue(format!("unknown log level '{}'", self.log_level)))
    }

    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.send_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "maxMessageSize must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_secs > 0
            && self.heartbeat_timeout_secs < self.heartbeat_interval_secs
        {
            return Err(ConfigError::InvalidValue(format!(
                "heartbeatTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        let _ = self.level()?;
        Ok(())
    }
}
