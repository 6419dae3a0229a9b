//! Application-level heartbeat.
//!
//! Each tick issues a fresh `heartbeat_id`, counts it as missed for every
//! connection, sends the `heartbeat` envelope, and evicts connections that
//! have now missed `missed_heartbeat_threshold` in a row. A client answers
//! with `heartbeat_response`; only the latest id resets its counter.
//!
//! The counter is bumped before the send so a response that races the send
//! lands after the increment and still clears it.

use std::collections::HashSet;

use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broadcast::Delivery;
use crate::errors::HubError;
use crate::hub::Hub;
use crate::ids::ConnectionId;
use crate::message::OutboundMessage;
use crate::metrics as names;
use crate::registry::EvictionReason;

impl Hub {
    /// Run one heartbeat round. Returns the number of connections the
    /// heartbeat reached.
    pub async fn heartbeat_tick(&self) -> Result<usize, HubError> {
        let heartbeat_id = Uuid::now_v7().to_string();
        let frame = OutboundMessage::heartbeat(&heartbeat_id).to_frame()?;

        let targets = {
            let mut state = self.state.lock();
            state.begin_heartbeat(heartbeat_id.clone(), Instant::now());
            state.targets(None, &HashSet::new())
        };
        let reached = self.fan_out(targets, frame, Delivery::Liveness).await;

        let overdue = self
            .state
            .lock()
            .overdue(self.config.missed_heartbeat_threshold);
        for (id, serial) in &overdue {
            if self.evict_serial(id, *serial, EvictionReason::MissedHeartbeats) {
                info!(
                    connection_id = %id,
                    threshold = self.config.missed_heartbeat_threshold,
                    "heartbeat threshold reached"
                );
            }
        }

        counter!(names::HUB_HEARTBEAT_TICKS_TOTAL).increment(1);
        debug!(%heartbeat_id, reached, evicted = overdue.len(), "heartbeat tick");
        Ok(reached)
    }

    /// Record a client's answer to a heartbeat.
    ///
    /// Only the most recently issued id counts; stale or unknown ids, and
    /// unknown connections, return `false`. A response is not activity.
    pub fn record_heartbeat_response(&self, id: &ConnectionId, heartbeat_id: &str) -> bool {
        let accepted = self.state.lock().accept_heartbeat_response(id, heartbeat_id);
        if !accepted {
            debug!(connection_id = %id, heartbeat_id, "ignored heartbeat response");
        }
        accepted
    }

    /// Id of the most recent heartbeat, if one has been issued.
    pub fn current_heartbeat_id(&self) -> Option<String> {
        self.state.lock().current_heartbeat().map(str::to_owned)
    }
}
