//! Event fan-out.
//!
//! Every broadcast follows the same shape: serialize once, snapshot the
//! targets under the registry lock, release it, send concurrently, then
//! record deliveries and evict every recipient whose send failed. No
//! retries and no backpressure: a failed send is a dead connection.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::hub::Hub;
use crate::ids::{BoardId, ConnectionId};
use crate::message::OutboundMessage;
use crate::metrics as names;
use crate::registry::{EvictionReason, Target};
use crate::transport::TransportError;

/// Outcome of [`Hub::batch_broadcast`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Recipients that received the whole sequence.
    pub successful_recipients: usize,
    /// Recipients whose delivery failed part-way (now evicted).
    pub failed_recipients: usize,
}

/// Whether deliveries count as activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Application traffic: bumps activity and message count.
    Application,
    /// Hub liveness traffic: leaves activity untouched.
    Liveness,
}

impl Hub {
    /// Send `message` to every connection not in `exclude`.
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast_all(
        &self,
        message: OutboundMessage,
        exclude: &HashSet<ConnectionId>,
    ) -> usize {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = message.event(), error = %e, "failed to serialize broadcast");
                return 0;
            }
        };
        let targets = self.state.lock().targets(None, exclude);
        let recipients = targets.len();
        let delivered = self.fan_out(targets, frame, Delivery::Application).await;
        debug!(event = message.event(), recipients, delivered, "broadcast to all");
        delivered
    }

    /// Send `message` to every connection watching `board`.
    ///
    /// The message is stamped with the board id and a fresh timestamp.
    pub async fn broadcast_to_board(
        &self,
        board: BoardId,
        message: OutboundMessage,
        exclude: &HashSet<ConnectionId>,
    ) -> usize {
        let message = message.for_board(board);
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = message.event(), board_id = %board, error = %e, "failed to serialize broadcast");
                return 0;
            }
        };
        let targets = self.state.lock().targets(Some(board), exclude);
        let recipients = targets.len();
        let delivered = self.fan_out(targets, frame, Delivery::Application).await;
        debug!(
            event = message.event(),
            board_id = %board,
            recipients,
            delivered,
            "broadcast to board"
        );
        delivered
    }

    /// Send `message` to one connection.
    ///
    /// Returns `false` for unknown ids and for failed sends; a failed send
    /// evicts the connection.
    pub async fn send_personal(&self, id: &ConnectionId, message: OutboundMessage) -> bool {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id = %id, event = message.event(), error = %e, "failed to serialize message");
                return false;
            }
        };
        let target = self.state.lock().target(id);
        let Some(target) = target else {
            debug!(connection_id = %id, "send to unknown connection");
            return false;
        };
        self.fan_out(vec![target], frame, Delivery::Application).await == 1
    }

    /// Send an ordered sequence to every connection not in `exclude`.
    ///
    /// Each recipient gets the messages one after another; recipients are
    /// served concurrently. A recipient whose send fails receives nothing
    /// further and is evicted.
    pub async fn batch_broadcast(
        &self,
        messages: &[OutboundMessage],
        exclude: &HashSet<ConnectionId>,
    ) -> BatchReport {
        let mut frames = Vec::with_capacity(messages.len());
        for message in messages {
            match message.to_frame() {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!(event = message.event(), error = %e, "failed to serialize batch message");
                    return BatchReport::default();
                }
            }
        }
        if frames.is_empty() {
            return BatchReport::default();
        }

        let targets = self.state.lock().targets(None, exclude);
        let frames = &frames;
        let results = join_all(targets.into_iter().map(|target| async move {
            let mut sent = 0u64;
            for frame in frames {
                if let Err(e) = target.transport.send(Arc::clone(frame)).await {
                    return (target, sent, Some(e));
                }
                sent += 1;
            }
            (target, sent, None)
        }))
        .await;

        let mut report = BatchReport::default();
        let mut sends = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (target, sent, failure) in results {
            if sent > 0 {
                sends.push((target.id.clone(), target.serial, sent));
            }
            counter!(names::HUB_MESSAGES_SENT_TOTAL).increment(sent);
            match failure {
                None => report.successful_recipients += 1,
                Some(e) => {
                    report.failed_recipients += 1;
                    failed.push((target, e));
                }
            }
        }
        if !sends.is_empty() {
            self.state.lock().record_send_counts(&sends, Instant::now());
        }
        for (target, e) in failed {
            self.evict_failed(&target, e);
        }
        debug!(
            messages = frames.len(),
            successful = report.successful_recipients,
            failed = report.failed_recipients,
            "batch broadcast"
        );
        report
    }

    /// Send one frame to each target concurrently. Returns the number of
    /// successful deliveries; failures are evicted.
    pub(crate) async fn fan_out(
        &self,
        targets: Vec<Target>,
        frame: Arc<str>,
        delivery: Delivery,
    ) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let results = join_all(targets.into_iter().map(|target| {
            let frame = Arc::clone(&frame);
            async move {
                let result = target.transport.send(frame).await;
                (target, result)
            }
        }))
        .await;

        let mut delivered = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (target, result) in results {
            match result {
                Ok(()) => delivered.push((target.id, target.serial)),
                Err(e) => failed.push((target, e)),
            }
        }

        if delivery == Delivery::Application && !delivered.is_empty() {
            self.state.lock().record_sends(&delivered, 1, Instant::now());
        }
        counter!(names::HUB_MESSAGES_SENT_TOTAL).increment(delivered.len() as u64);
        for (target, e) in failed {
            self.evict_failed(&target, e);
        }
        delivered.len()
    }

    fn evict_failed(&self, target: &Target, error: TransportError) {
        counter!(names::HUB_SEND_FAILURES_TOTAL).increment(1);
        warn!(connection_id = %target.id, error = %error, "send failed, evicting connection");
        let _ = self.evict_serial(&target.id, target.serial, EvictionReason::SendFailed);
    }
}
