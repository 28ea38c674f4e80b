//! Message and conversation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClientId, ConversationId, MessageId, UserId};

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// Image attachment
    Image,
    /// Video attachment
    Video,
    /// Audio clip
    Audio,
    /// Generic file
    File,
    /// System notice (joins, renames, ...)
    System,
}

/// Aggregated reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// Reaction emoji.
    pub emoji: String,
    /// Users who reacted with this emoji.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Number of reactions.
    pub count: u32,
}

/// A chat message.
///
/// Identity is dual: `id` is assigned by the server once the message is
/// confirmed, `client_id` is minted locally for messages this client sent and
/// is only used to reconcile the optimistic copy with its server echo.
///
/// The four status flags are independent of each other. Deletion is a flag,
/// never a removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server id. `None` until confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Local correlation id. `None` for messages originated elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Content kind.
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Content body.
    pub content: String,
    /// Message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Client-stamped for optimistic messages, server-stamped once confirmed.
    pub created_at: DateTime<Utc>,
    /// Aggregated reactions, delivered by full-message updates.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Sent locally, not yet confirmed.
    #[serde(default)]
    pub is_pending: bool,
    /// Local send failed.
    #[serde(default)]
    pub has_failed: bool,
    /// Content was edited after sending.
    #[serde(default)]
    pub is_edited: bool,
    /// Message was deleted.
    #[serde(default)]
    pub is_deleted: bool,
}

impl Message {
    /// Build an optimistic message for a local send.
    ///
    /// The message carries no server id and starts pending.
    pub fn optimistic(
        conversation_id: ConversationId,
        sender_id: UserId,
        client_id: ClientId,
        message_type: MessageType,
        content: String,
        reply_to: Option<MessageId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            client_id: Some(client_id),
            conversation_id,
            sender_id,
            message_type,
            content,
            reply_to,
            created_at,
            reactions: Vec::new(),
            is_pending: true,
            has_failed: false,
            is_edited: false,
            is_deleted: false,
        }
    }

    /// Build a confirmed text message as the backend would deliver it.
    pub fn confirmed(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            client_id: None,
            conversation_id,
            sender_id,
            message_type: MessageType::Text,
            content: content.into(),
            reply_to: None,
            created_at,
            reactions: Vec::new(),
            is_pending: false,
            has_failed: false,
            is_edited: false,
            is_deleted: false,
        }
    }

    /// Attach a correlation id (backend echo of a local send).
    #[must_use]
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// True once the server has assigned an id.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }
}

/// A conversation as listed by the backend.
///
/// Display data only; the sync core replaces the list wholesale on reload and
/// never edits individual fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id.
    pub id: ConversationId,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Participant user ids.
    #[serde(default)]
    pub participants: Vec<UserId>,
    /// Timestamp of the most recent message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Conversation with only an id.
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Self { id: id.into(), title: None, participants: Vec::new(), last_message_at: None }
    }

    /// Set the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// One page of message history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Messages in this page, any order.
    pub messages: Vec<Message>,
    /// More history exists before this page.
    pub has_more: bool,
    /// Cursor to pass for the next older page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}
