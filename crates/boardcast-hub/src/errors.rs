//! Hub error types.
//!
//! Almost nothing escapes the hub as an error: send failures become
//! evictions, unknown ids become `false`. What remains is the rare
//! serialization failure, surfaced to background loops so they can log and
//! back off.

use thiserror::Error;

/// Errors produced inside the hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// An outbound message could not be serialized.
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = HubError::Serialize(json_err);
        assert!(err.to_string().starts_with("failed to serialize outbound message"));
    }
}
