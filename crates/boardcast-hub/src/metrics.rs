//! Metric names recorded by the hub.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

/// Connections registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Live connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections evicted (counter, labels: reason).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// Frames delivered to a client buffer (counter).
pub const HUB_MESSAGES_SENT_TOTAL: &str = "hub_messages_sent_total";
/// Sends that failed or timed out (counter).
pub const HUB_SEND_FAILURES_TOTAL: &str = "hub_send_failures_total";
/// Heartbeat ticks run (counter).
pub const HUB_HEARTBEAT_TICKS_TOTAL: &str = "hub_heartbeat_ticks_total";
/// Background ticks that returned an error or panicked (counter, labels: task).
pub const HUB_LOOP_ERRORS_TOTAL: &str = "hub_loop_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            HUB_EVICTIONS_TOTAL,
            HUB_MESSAGES_SENT_TOTAL,
            HUB_SEND_FAILURES_TOTAL,
            HUB_HEARTBEAT_TICKS_TOTAL,
            HUB_LOOP_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
