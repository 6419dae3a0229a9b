//! Client → hub control messages.
//!
//! Clients talk to the hub over the same channel they receive events on.
//! Each text frame is a JSON object tagged by `type`.

use serde::Deserialize;
use thiserror::Error;

use crate::ids::BoardId;

/// A control message received from a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a board's broadcast group.
    Subscribe {
        /// Board to join.
        board_id: BoardId,
    },
    /// Leave a board's broadcast group.
    Unsubscribe {
        /// Board to leave.
        board_id: BoardId,
    },
    /// Receive every board-scoped event.
    SubscribeAll,
    /// Liveness probe; answered with `pong`.
    Ping,
    /// Answer to the most recent `heartbeat` envelope.
    HeartbeatResponse {
        /// Echo of the heartbeat's `heartbeat_id`.
        heartbeat_id: String,
    },
}

/// Why a client frame could not be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, unknown `type`, or missing/mistyped fields.
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary frame that is not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotText,
}

impl ClientMessage {
    /// Parse a client text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
