//! Protocol decoding errors.

use thiserror::Error;

/// Result alias for protocol decoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding feed payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload for a known event type did not match its schema
    #[error("malformed {event} payload: {reason}")]
    MalformedPayload {
        /// Event name the payload belonged to
        event: String,
        /// Decoder message
        reason: String,
    },

    /// Raw event envelope could not be decoded
    #[error("malformed event envelope: {0}")]
    MalformedEnvelope(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedEnvelope(err.to_string())
    }
}
