//! Settings types.
//!
//! All structs use `#[serde(default)]` so a partial settings file only needs
//! to name the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the boardcast server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardcastSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Broadcast hub timings and limits.
    pub hub: HubSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl BoardcastSettings {
    /// Reject zero intervals, limits, and thresholds.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.hub.validate()
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Seconds to wait for background tasks during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_connections: 1_000,
            max_message_size: 64 * 1024,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerSettings {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Broadcast hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Seconds between heartbeat ticks.
    pub heartbeat_interval_secs: u64,
    /// Consecutive unanswered heartbeats before a connection is evicted.
    pub missed_heartbeat_threshold: u32,
    /// Seconds between inactivity sweeps.
    pub cleanup_interval_secs: u64,
    /// Seconds without activity before a connection is evicted.
    pub inactivity_timeout_secs: u64,
    /// Milliseconds a single send may wait on a full client buffer.
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per connection.
    pub channel_capacity: usize,
    /// Milliseconds a background loop sleeps after a failed tick.
    pub loop_error_backoff_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            missed_heartbeat_threshold: 3,
            cleanup_interval_secs: 60,
            inactivity_timeout_secs: 300,
            send_timeout_ms: 5_000,
            channel_capacity: 256,
            loop_error_backoff_ms: 1_000,
        }
    }
}

impl HubSettings {
    fn validate(&self) -> Result<()> {
        let checks = [
            (self.heartbeat_interval_secs == 0, "hub.heartbeatIntervalSecs must be > 0"),
            (self.missed_heartbeat_threshold == 0, "hub.missedHeartbeatThreshold must be > 0"),
            (self.cleanup_interval_secs == 0, "hub.cleanupIntervalSecs must be > 0"),
            (self.inactivity_timeout_secs == 0, "hub.inactivityTimeoutSecs must be > 0"),
            (self.send_timeout_ms == 0, "hub.sendTimeoutMs must be > 0"),
            (self.channel_capacity == 0, "hub.channelCapacity must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(SettingsError::InvalidValue((*msg).to_string())),
            None => Ok(()),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log settings. `RUST_LOG` takes precedence over `level` when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info,boardcast_hub=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
