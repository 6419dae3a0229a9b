//! Hub timing configuration.

use std::time::Duration;

/// Intervals and thresholds for the hub's background tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Time between heartbeat ticks.
    pub heartbeat_interval: Duration,
    /// Unanswered heartbeats before a connection is evicted.
    pub missed_heartbeat_threshold: u32,
    /// Time between inactivity sweeps.
    pub cleanup_interval: Duration,
    /// Idle time after which a connection is evicted.
    pub inactivity_timeout: Duration,
    /// Pause after a failed background tick before the next one.
    pub loop_error_backoff: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            missed_heartbeat_threshold: 3,
            cleanup_interval: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(300),
            loop_error_backoff: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.missed_heartbeat_threshold, 3);
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(60));
        assert_eq!(cfg.inactivity_timeout, Duration::from_secs(300));
    }
}
