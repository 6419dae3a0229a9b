//! Identifier newtypes.
//!
//! Connection ids are opaque strings (client-supplied or generated as
//! `conn_<uuid v7>`); board ids are the integer keys handed over by the
//! board service.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one live client connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a new server-side id (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a board, passed through opaquely from the board service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(i64);

impl BoardId {
    /// Wildcard sentinel: a subscription to every board.
    pub const ALL: BoardId = BoardId(-1);

    /// Wrap a raw board id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this is the wildcard sentinel.
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.0 == Self::ALL.0
    }
}

impl From<i64> for BoardId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }

    #[test]
    fn supplied_id_preserved() {
        let id = ConnectionId::from("client-42");
        assert_eq!(id.to_string(), "client-42");
    }

    #[test]
    fn connection_id_serializes_as_plain_string() {
        let id = ConnectionId::from("c1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c1\"");
    }

    #[test]
    fn board_id_wildcard() {
        assert!(BoardId::ALL.is_wildcard());
        assert!(!BoardId::new(7).is_wildcard());
        assert_eq!(BoardId::ALL.get(), -1);
    }

    #[test]
    fn board_id_serializes_as_integer() {
        let json = serde_json::to_string(&BoardId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: BoardId = serde_json::from_str("12").unwrap();
        assert_eq!(back, BoardId::new(12));
    }
}
