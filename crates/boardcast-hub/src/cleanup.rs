//! Inactivity sweep.

use tokio::time::Instant;
use tracing::{debug, info};

use crate::hub::Hub;
use crate::registry::EvictionReason;

impl Hub {
    /// Evict every connection idle for longer than the inactivity timeout.
    /// Returns the number evicted.
    ///
    /// Runs independently of heartbeat state: answering heartbeats does not
    /// keep a connection alive here.
    pub fn cleanup_tick(&self) -> usize {
        let idle = self
            .state
            .lock()
            .idle(self.config.inactivity_timeout, Instant::now());
        let evicted = idle
            .iter()
            .filter(|(id, serial)| self.evict_serial(id, *serial, EvictionReason::Inactive))
            .count();
        if evicted > 0 {
            info!(
                evicted,
                timeout_secs = self.config.inactivity_timeout.as_secs(),
                "evicted inactive connections"
            );
        } else {
            debug!("inactivity sweep found nothing");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::config::HubConfig;
    use crate::hub::Hub;
    use crate::message::OutboundMessage;
    use crate::testing::RecordingTransport;

    fn manual_hub() -> Arc<Hub> {
        Arc::new(Hub::new(HubConfig {
            heartbeat_interval: Duration::from_secs(36_000),
            cleanup_interval: Duration::from_secs(36_000),
            inactivity_timeout: Duration::from_secs(300),
            ..HubConfig::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_evicted_after_timeout() {
        let hub = manual_hub();
        let t = RecordingTransport::new();
        let id = hub.register(t.clone(), None, None);

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(hub.cleanup_tick(), 0);
        assert!(hub.contains(&id));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(hub.cleanup_tick(), 1);
        assert!(!hub.contains(&id));
        assert!(t.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn application_traffic_keeps_connection() {
        let hub = manual_hub();
        let id = hub.register(RecordingTransport::new(), None, None);

        tokio::time::advance(Duration::from_secs(200)).await;
        let _ = hub
            .broadcast_all(OutboundMessage::new("x", json!({})), &HashSet::new())
            .await;
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(hub.cleanup_tick(), 0);
        assert!(hub.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_responses_do_not_prevent_eviction() {
        let hub = manual_hub();
        let id = hub.register(RecordingTransport::new(), None, None);
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(100)).await;
            let _ = hub.heartbeat_tick().await.unwrap();
            let hb = hub.current_heartbeat_id().unwrap();
            assert!(hub.record_heartbeat_response(&id, &hb));
        }
        assert_eq!(hub.cleanup_tick(), 1);
        assert!(!hub.contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_ping_counts_as_activity() {
        let hub = manual_hub();
        let id = hub.register(RecordingTransport::new(), None, None);
        tokio::time::advance(Duration::from_secs(250)).await;
        hub.handle_client_message(&id, r#"{"type":"ping"}"#).await.unwrap();
        tokio::time::advance(Duration::from_secs(250)).await;
        assert_eq!(hub.cleanup_tick(), 0);
    }
}
