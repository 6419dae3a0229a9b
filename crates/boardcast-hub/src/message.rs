//! Outbound message envelope.
//!
//! Every frame the hub writes to a client has the same shape:
//!
//! ```json
//! {"event": "ticket_created", "board_id": 7, "timestamp": "2026-01-01T00:00:00Z", "data": {}}
//! ```
//!
//! `board_id` is omitted for events that are not board-scoped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::HubError;
use crate::ids::{BoardId, ConnectionId};

/// Event names the hub itself emits.
pub mod events {
    /// Sent once after a connection is registered.
    pub const CONNECTED: &str = "connected";
    /// Periodic liveness probe.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Reply to a client `ping`.
    pub const PONG: &str = "pong";
    /// Acknowledges a `subscribe` / `subscribe_all`.
    pub const SUBSCRIBED: &str = "subscribed";
    /// Acknowledges an `unsubscribe`.
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    /// A control message from the client could not be handled.
    pub const ERROR: &str = "error";
}

/// Immutable outbound event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundMessage {
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    board_id: Option<BoardId>,
    timestamp: DateTime<Utc>,
    data: Value,
}

impl OutboundMessage {
    /// Create a message stamped with the current time.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            board_id: None,
            timestamp: Utc::now(),
            data,
        }
    }

    /// The same event re-stamped for delivery to a board's audience.
    #[must_use]
    pub fn for_board(self, board_id: BoardId) -> Self {
        Self {
            board_id: Some(board_id),
            timestamp: Utc::now(),
            ..self
        }
    }

    /// Event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Board the event belongs to, if board-scoped.
    pub fn board_id(&self) -> Option<BoardId> {
        self.board_id
    }

    /// Emission time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Serialize once into a frame shared by all recipients.
    pub fn to_frame(&self) -> Result<Arc<str>, HubError> {
        let json = serde_json::to_string(self).map_err(HubError::Serialize)?;
        Ok(Arc::from(json))
    }

    /// Greeting sent after registration.
    pub fn connected(id: &ConnectionId) -> Self {
        Self::new(events::CONNECTED, json!({ "connection_id": id }))
    }

    pub(crate) fn heartbeat(heartbeat_id: &str) -> Self {
        Self::new(events::HEARTBEAT, json!({ "heartbeat_id": heartbeat_id }))
    }

    pub(crate) fn pong() -> Self {
        Self::new(events::PONG, json!({}))
    }

    pub(crate) fn subscribed(board_id: BoardId) -> Self {
        Self::new(events::SUBSCRIBED, json!({ "board_id": board_id }))
    }

    pub(crate) fn unsubscribed(board_id: BoardId) -> Self {
        Self::new(events::UNSUBSCRIBED, json!({ "board_id": board_id }))
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::new(events::ERROR, json!({ "message": message.into() }))
    }
}
