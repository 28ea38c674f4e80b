//! Discriminated event feed.
//!
//! The event feed carries every non-message mutation for a conversation. On
//! the wire each entry is a [`RawEvent`] envelope; [`FeedEvent::decode`]
//! turns it into a typed variant.
//!
//! # Invariants
//!
//! - Unknown event names never fail to decode; they map to
//!   [`FeedEvent::Unknown`] and are ignored by consumers.
//! - A known event name with a malformed payload is a
//!   [`ProtocolError::MalformedPayload`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{MessageId, ProtocolError, Result, UserId};

/// Event name for content edits.
pub const MESSAGE_EDITED: &str = "message_edited";

/// Event name for deletions.
pub const MESSAGE_DELETED: &str = "message_deleted";

/// Event name for a remote user starting to type.
pub const TYPING_START: &str = "typing_start";

/// Event name for a remote user stopping typing.
pub const TYPING_STOP: &str = "typing_stop";

/// Event envelope as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event name.
    pub event: String,
    /// Event-specific payload object.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RawEvent {
    /// Build an envelope from a name and payload.
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }

    /// Parse an envelope from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for `typing_start` / `typing_stop`.
    pub fn is_typing(&self) -> bool {
        self.event == TYPING_START || self.event == TYPING_STOP
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditedPayload {
    message_id: MessageId,
    content: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    message_id: MessageId,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    user_id: UserId,
}

/// Decoded feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Message content was edited.
    MessageEdited {
        /// Server id of the edited message.
        message_id: MessageId,
        /// New content.
        content: String,
    },

    /// Message was deleted.
    MessageDeleted {
        /// Server id of the deleted message.
        message_id: MessageId,
    },

    /// Remote user started typing.
    TypingStart {
        /// Typing user.
        user_id: UserId,
    },

    /// Remote user stopped typing.
    TypingStop {
        /// User who stopped.
        user_id: UserId,
    },

    /// Event type this client does not handle.
    Unknown {
        /// Event name as received.
        event: String,
    },
}

impl FeedEvent {
    /// Decode a raw envelope.
    pub fn decode(raw: &RawEvent) -> Result<Self> {
        match raw.event.as_str() {
            MESSAGE_EDITED => {
                let p: EditedPayload = payload(raw)?;
                Ok(Self::MessageEdited { message_id: p.message_id, content: p.content })
            },
            MESSAGE_DELETED => {
                let p: DeletedPayload = payload(raw)?;
                Ok(Self::MessageDeleted { message_id: p.message_id })
            },
            TYPING_START => {
                let p: TypingPayload = payload(raw)?;
                Ok(Self::TypingStart { user_id: p.user_id })
            },
            TYPING_STOP => {
                let p: TypingPayload = payload(raw)?;
                Ok(Self::TypingStop { user_id: p.user_id })
            },
            other => Ok(Self::Unknown { event: other.to_owned() }),
        }
    }

    /// Encode back into an envelope.
    ///
    /// [`FeedEvent::Unknown`] encodes with an empty object payload.
    pub fn encode(&self) -> RawEvent {
        let (event, value) = match self {
            Self::MessageEdited { message_id, content } => (
                MESSAGE_EDITED,
                serde_json::json!({ "messageId": message_id, "content": content }),
            ),
            Self::MessageDeleted { message_id } => {
                (MESSAGE_DELETED, serde_json::json!({ "messageId": message_id }))
            },
            Self::TypingStart { user_id } => {
                (TYPING_START, serde_json::json!({ "userId": user_id }))
            },
            Self::TypingStop { user_id } => (TYPING_STOP, serde_json::json!({ "userId": user_id })),
            Self::Unknown { event } => {
                return RawEvent::new(event.clone(), serde_json::json!({}));
            },
        };
        RawEvent::new(event, value)
    }
}

fn payload<T: DeserializeOwned>(raw: &RawEvent) -> Result<T> {
    serde_json::from_value(raw.payload.clone()).map_err(|e| ProtocolError::MalformedPayload {
        event: raw.event.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_deleted() {
        let raw = RawEvent::from_json(r#"{"event":"message_deleted","payload":{"messageId":"m1"}}"#)
            .unwrap();

        assert_eq!(
            FeedEvent::decode(&raw).unwrap(),
            FeedEvent::MessageDeleted { message_id: "m1".into() }
        );
    }

    #[test]
    fn unknown_event_is_not_an_error() {
        let raw = RawEvent::new("member_joined", serde_json::json!({"userId": "bob"}));
        assert_eq!(
            FeedEvent::decode(&raw).unwrap(),
            FeedEvent::Unknown { event: "member_joined".into() }
        );
    }

    #[test]
    fn malformed_known_payload_is_rejected() {
        let raw = RawEvent::new(MESSAGE_EDITED, serde_json::json!({"messageId": "m1"}));
        assert!(matches!(
            FeedEvent::decode(&raw),
            Err(ProtocolError::MalformedPayload { ref event, .. }) if event == MESSAGE_EDITED
        ));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let raw = RawEvent::from_json(r#"{"event":"typing_stop"}"#).unwrap();
        assert!(raw.is_typing());
        assert!(FeedEvent::decode(&raw).is_err());
    }
}
