//! The hub: connection registry, subscription index, and control-message
//! handling.
//!
//! Fan-out lives in `broadcast`, liveness in `heartbeat` and `cleanup`, and
//! background task lifecycle in `tasks`. All of them are `impl Hub` blocks
//! over the state defined here.

use std::sync::{Arc, Weak};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::HubConfig;
use crate::ids::{BoardId, ConnectionId};
use crate::message::OutboundMessage;
use crate::metrics as names;
use crate::protocol::{ClientMessage, ProtocolError};
use crate::registry::{
    ConnectionEntry, ConnectionSnapshot, ConnectionStats, EvictionReason, RegistryState,
};
use crate::tasks::BackgroundTasks;
use crate::transport::Transport;

/// In-process broadcast hub. Share it as `Arc<Hub>`.
pub struct Hub {
    pub(crate) config: HubConfig,
    pub(crate) state: Mutex<RegistryState>,
    pub(crate) tasks: Mutex<BackgroundTasks>,
    pub(crate) cancel: CancellationToken,
}

impl Hub {
    /// Create an empty hub. Background tasks start with the first
    /// registration.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
            tasks: Mutex::new(BackgroundTasks::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a connection and return its id.
    ///
    /// A supplied id that is already registered replaces the previous
    /// connection, whose transport is closed.
    pub fn register(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        supplied_id: Option<ConnectionId>,
        user_label: Option<String>,
    ) -> ConnectionId {
        let id = supplied_id.unwrap_or_default();
        let (replaced, total) = {
            let mut state = self.state.lock();
            let replaced = state.insert(id.clone(), transport, user_label.clone(), Instant::now());
            (replaced, state.len())
        };
        if let Some(old) = replaced {
            self.finish_eviction(&id, old, EvictionReason::Replaced);
        }

        counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(names::WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(connection_id = %id, user = ?user_label, total, "connection registered");

        self.ensure_background_tasks();
        id
    }

    /// Remove a connection. Unknown ids are a no-op returning `false`.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.evict(id, EvictionReason::Unregistered)
    }

    /// Remove `id` only while it is still bound to `transport`.
    ///
    /// Sessions use this on disconnect so a client that was replaced by a
    /// newer connection under the same id does not remove its successor.
    pub fn unregister_transport(&self, id: &ConnectionId, transport: &Weak<dyn Transport>) -> bool {
        let removed = self.state.lock().remove_if_transport(id, transport);
        match removed {
            Some(entry) => {
                self.finish_eviction(id, entry, EvictionReason::Unregistered);
                true
            }
            None => false,
        }
    }

    /// Evict every connection (hub shutdown).
    pub fn close_all(&self) -> usize {
        let drained = self.state.lock().drain();
        let count = drained.len();
        for (id, entry) in drained {
            self.finish_eviction(&id, entry, EvictionReason::Shutdown);
        }
        if count > 0 {
            info!(count, "closed all connections");
        }
        count
    }

    /// Bump activity and message count after a successful application send.
    pub fn record_activity(&self, id: &ConnectionId) -> bool {
        self.state.lock().record_activity(id, Instant::now())
    }

    /// Bump activity only, for inbound client traffic.
    pub fn touch(&self, id: &ConnectionId) -> bool {
        self.state.lock().touch(id, Instant::now())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.state.lock().contains(id)
    }

    /// Live connection count.
    pub fn count(&self) -> usize {
        self.state.lock().len()
    }

    /// Add `board` to a connection's subscriptions.
    pub fn subscribe(&self, id: &ConnectionId, board: BoardId) -> bool {
        let subscribed = self
            .state
            .lock()
            .subscriptions_mut(id)
            .map(|subs| subs.subscribe(board));
        if let Some(added) = subscribed {
            debug!(connection_id = %id, board_id = %board, added, "subscribed");
        }
        subscribed.is_some()
    }

    /// Remove `board` from a connection's subscriptions.
    ///
    /// Removing the last board returns the connection to receiving every
    /// board.
    pub fn unsubscribe(&self, id: &ConnectionId, board: BoardId) -> bool {
        let removed = self
            .state
            .lock()
            .subscriptions_mut(id)
            .map(|subs| subs.unsubscribe(board));
        if let Some(removed) = removed {
            debug!(connection_id = %id, board_id = %board, removed, "unsubscribed");
        }
        removed.is_some()
    }

    /// Subscribe a connection to every board.
    pub fn subscribe_all(&self, id: &ConnectionId) -> bool {
        self.subscribe(id, BoardId::ALL)
    }

    /// Whether events for `board` reach `id`.
    pub fn is_subscribed(&self, id: &ConnectionId, board: BoardId) -> bool {
        self.state
            .lock()
            .subscriptions(id)
            .is_some_and(|subs| subs.matches(board))
    }

    /// A connection's subscribed boards, ascending. `None` for unknown ids.
    pub fn subscriptions(&self, id: &ConnectionId) -> Option<Vec<BoardId>> {
        self.state.lock().subscriptions(id).map(|subs| subs.sorted())
    }

    /// Details for one connection.
    pub fn snapshot(&self, id: &ConnectionId) -> Option<ConnectionSnapshot> {
        self.state.lock().snapshot(id, Instant::now())
    }

    /// Details for every connection.
    pub fn connection_stats(&self) -> ConnectionStats {
        self.state.lock().stats(Instant::now())
    }

    /// Parse and apply one client control message.
    ///
    /// A message that cannot be parsed is answered with an `error` envelope
    /// to this client only, and the parse error is returned.
    pub async fn handle_client_message(
        &self,
        id: &ConnectionId,
        text: &str,
    ) -> Result<(), ProtocolError> {
        match ClientMessage::parse(text) {
            Ok(message) => {
                self.apply(id, message).await;
                Ok(())
            }
            Err(err) => Err(self.reject(id, err).await),
        }
    }

    /// Like [`handle_client_message`](Self::handle_client_message) for a
    /// binary frame, which must hold UTF-8 text.
    pub async fn handle_client_frame(
        &self,
        id: &ConnectionId,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_client_message(id, text).await,
            Err(_) => Err(self.reject(id, ProtocolError::NotText).await),
        }
    }

    async fn reject(&self, id: &ConnectionId, err: ProtocolError) -> ProtocolError {
        debug!(connection_id = %id, error = %err, "rejected client message");
        let _ = self.send_personal(id, OutboundMessage::error(err.to_string())).await;
        err
    }

    async fn apply(&self, id: &ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { board_id } => {
                if self.subscribe(id, board_id) {
                    let _ = self.touch(id);
                    let _ = self.send_personal(id, OutboundMessage::subscribed(board_id)).await;
                }
            }
            ClientMessage::Unsubscribe { board_id } => {
                if self.unsubscribe(id, board_id) {
                    let _ = self.touch(id);
                    let _ = self.send_personal(id, OutboundMessage::unsubscribed(board_id)).await;
                }
            }
            ClientMessage::SubscribeAll => {
                if self.subscribe_all(id) {
                    let _ = self.touch(id);
                    let _ = self.send_personal(id, OutboundMessage::subscribed(BoardId::ALL)).await;
                }
            }
            ClientMessage::Ping => {
                if self.touch(id) {
                    let _ = self.send_personal(id, OutboundMessage::pong()).await;
                }
            }
            ClientMessage::HeartbeatResponse { heartbeat_id } => {
                let _ = self.record_heartbeat_response(id, &heartbeat_id);
            }
        }
    }

    /// Remove whatever is registered under `id`.
    pub(crate) fn evict(&self, id: &ConnectionId, reason: EvictionReason) -> bool {
        let removed = self.state.lock().remove(id);
        match removed {
            Some(entry) => {
                self.finish_eviction(id, entry, reason);
                true
            }
            None => false,
        }
    }

    /// Remove `id` only if it is still the connection captured as `serial`.
    pub(crate) fn evict_serial(&self, id: &ConnectionId, serial: u64, reason: EvictionReason) -> bool {
        let removed = self.state.lock().remove_if_serial(id, serial);
        match removed {
            Some(entry) => {
                self.finish_eviction(id, entry, reason);
                true
            }
            None => false,
        }
    }

    #[allow(clippy::unused_self)]
    fn finish_eviction(&self, id: &ConnectionId, entry: ConnectionEntry, reason: EvictionReason) {
        entry.transport.close();
        counter!(names::HUB_EVICTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(names::WS_CONNECTIONS_ACTIVE).decrement(1.0);
        info!(
            connection_id = %id,
            reason = %reason,
            duration_secs = entry.meta.connected_mono.elapsed().as_secs_f64(),
            messages_sent = entry.meta.message_count,
            heartbeat_responses = entry.meta.heartbeat_responses,
            "connection removed"
        );
    }
}
