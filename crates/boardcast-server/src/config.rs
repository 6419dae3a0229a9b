//! Server configuration.

use std::time::Duration;

use boardcast_hub::HubConfig;
use boardcast_settings::BoardcastSettings;

/// Runtime configuration for [`BoardcastServer`](crate::BoardcastServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub channel_capacity: usize,
    /// How long a send may wait on a full client buffer.
    pub send_timeout: Duration,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
    /// Hub timings.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1_000,
            max_message_size: 64 * 1024,
            channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &BoardcastSettings) -> Self {
        let server = &settings.server;
        let hub = &settings.hub;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            channel_capacity: hub.channel_capacity,
            send_timeout: Duration::from_millis(hub.send_timeout_ms),
            shutdown_timeout: Duration::from_secs(server.shutdown_timeout_secs),
            hub: HubConfig {
                heartbeat_interval: Duration::from_secs(hub.heartbeat_interval_secs),
                missed_heartbeat_threshold: hub.missed_heartbeat_threshold,
                cleanup_interval: Duration::from_secs(hub.cleanup_interval_secs),
                inactivity_timeout: Duration::from_secs(hub.inactivity_timeout_secs),
                loop_error_backoff: Duration::from_millis(hub.loop_error_backoff_ms),
            },
        }
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
