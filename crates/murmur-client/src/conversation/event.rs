//! Conversation sync inputs and outputs.
//!
//! [`SyncEvent`] covers user intents, transport results fed back by the
//! runtime, and items pushed by the live feeds. [`SyncAction`] is everything
//! the state machine asks its runtime to do.

use std::sync::Arc;

use murmur_core::OutgoingMessage;
use murmur_proto::{
    ClientId, Conversation, ConversationId, Message, MessageId, MessagePage, MessageType, RawEvent,
};

use super::ConversationSyncState;

/// Events processed by [`crate::ConversationSync`].
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Fetch the conversation list.
    LoadConversations,

    /// Conversation list fetched.
    ConversationsLoaded {
        /// Full list, replaces the current one.
        conversations: Vec<Conversation>,
    },

    /// Conversation list fetch failed.
    ConversationsFailed {
        /// Human-readable failure.
        reason: String,
    },

    /// Join a conversation's live feeds.
    JoinConversation {
        /// Conversation to join.
        conversation_id: ConversationId,
    },

    /// Transport answered a join.
    JoinCompleted {
        /// Joined conversation.
        conversation_id: ConversationId,
        /// Feeds may now be relied on.
        accepted: bool,
    },

    /// Leave a conversation's live feeds.
    LeaveConversation {
        /// Conversation to leave.
        conversation_id: ConversationId,
    },

    /// Send a message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Content body.
        content: String,
        /// Content kind.
        message_type: MessageType,
        /// Message being replied to.
        reply_to: Option<MessageId>,
    },

    /// Transport answered a send.
    SendCompleted {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Correlation id of the send.
        client_id: ClientId,
        /// Backend accepted the message.
        is_ok: bool,
    },

    /// Re-send a failed message.
    RetryMessage {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Correlation id of the failed message.
        client_id: ClientId,
    },

    /// Mark a conversation read.
    MarkAsRead {
        /// Conversation to mark.
        conversation_id: ConversationId,
        /// Last read message.
        message_id: MessageId,
    },

    /// Transport answered a mark-read, successfully or not.
    MarkReadCompleted {
        /// Marked conversation.
        conversation_id: ConversationId,
    },

    /// Add a reaction.
    AddReaction {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Reacted message.
        message_id: MessageId,
        /// Reaction emoji.
        emoji: String,
    },

    /// Remove a reaction.
    RemoveReaction {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Reacted message.
        message_id: MessageId,
        /// Reaction emoji.
        emoji: String,
    },

    /// Message pushed by a message feed.
    MessageReceived {
        /// Conversation the feed belongs to.
        conversation_id: ConversationId,
        /// Delivered message.
        message: Message,
    },

    /// Raw envelope pushed by an event feed.
    EventReceived {
        /// Conversation the feed belongs to.
        conversation_id: ConversationId,
        /// Undecoded event.
        event: RawEvent,
    },

    /// Message content was edited.
    MessageEdited {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Server id of the message.
        message_id: MessageId,
        /// New content.
        content: String,
    },

    /// Message was deleted.
    MessageDeleted {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Server id of the message.
        message_id: MessageId,
    },

    /// Fetch the next page of older messages.
    LoadHistory {
        /// Conversation to page.
        conversation_id: ConversationId,
    },

    /// History page fetched.
    HistoryLoaded {
        /// Paged conversation.
        conversation_id: ConversationId,
        /// Fetched page.
        page: MessagePage,
    },

    /// History fetch failed.
    HistoryFailed {
        /// Paged conversation.
        conversation_id: ConversationId,
        /// Human-readable failure.
        reason: String,
    },

    /// Point the active conversation somewhere else (or nowhere).
    SetActiveConversation {
        /// New active conversation.
        conversation_id: Option<ConversationId>,
    },

    /// Clear the last error.
    ClearError,

    /// Tear down every subscription and stop accepting intents.
    Shutdown,
}

/// Actions produced by [`crate::ConversationSync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Emit a new snapshot.
    Publish(Arc<ConversationSyncState>),

    /// Call `fetch_conversations` and feed back the result.
    FetchConversations,

    /// Call `join_conversation` and feed back `JoinCompleted`.
    Join {
        /// Conversation to join.
        conversation_id: ConversationId,
    },

    /// Open the message and event feeds for a joined conversation.
    OpenSubscriptions {
        /// Joined conversation.
        conversation_id: ConversationId,
    },

    /// Cancel both feeds for a conversation.
    CloseSubscriptions {
        /// Conversation being left.
        conversation_id: ConversationId,
    },

    /// Call `leave_conversation`.
    Leave {
        /// Conversation being left.
        conversation_id: ConversationId,
    },

    /// Call `send_message` and feed back `SendCompleted`.
    Send(OutgoingMessage),

    /// Call `mark_as_read` and feed back `MarkReadCompleted`.
    MarkAsRead {
        /// Conversation to mark.
        conversation_id: ConversationId,
        /// Last read message.
        message_id: MessageId,
    },

    /// Call `add_reaction`.
    AddReaction {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Reacted message.
        message_id: MessageId,
        /// Reaction emoji.
        emoji: String,
    },

    /// Call `remove_reaction`.
    RemoveReaction {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Reacted message.
        message_id: MessageId,
        /// Reaction emoji.
        emoji: String,
    },

    /// Call `fetch_messages` and feed back the page.
    FetchHistory {
        /// Conversation to page.
        conversation_id: ConversationId,
        /// Cursor from the previous page.
        before: Option<String>,
    },

    /// Cancel every open subscription.
    CloseAllSubscriptions,
}
