//! Transport contract.
//!
//! The networking layer (sockets, reconnection, framing, auth) is out of scope
//! for the sync core. [`Transport`] is the boundary: every method is either a
//! request/response call or a lazy feed.
//!
//! # Feeds
//!
//! [`Transport::message_stream`] and [`Transport::event_stream`] return lazy,
//! infinite, non-restartable streams. Each call opens an independent handle;
//! dropping the stream releases it. Feeds may deliver out of order and may
//! redeliver.

use std::future::Future;

use futures::stream::BoxStream;
use murmur_proto::{
    ClientId, Conversation, ConversationId, Message, MessageId, MessagePage, MessageType, RawEvent,
};

use crate::TransportError;

/// Live message feed for one conversation.
pub type MessageStream = BoxStream<'static, Message>;

/// Live event feed for one conversation.
pub type EventStream = BoxStream<'static, RawEvent>;

/// Outgoing message request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Content body.
    pub content: String,
    /// Content kind.
    pub message_type: MessageType,
    /// Message being replied to.
    pub reply_to: Option<MessageId>,
    /// Correlation id the backend must echo back on the message feed.
    pub client_id: ClientId,
}

/// Backend reply to a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    /// Backend accepted the message.
    pub is_ok: bool,
}

impl SendReceipt {
    /// Accepted send.
    pub const OK: Self = Self { is_ok: true };

    /// Refused send.
    pub const FAILED: Self = Self { is_ok: false };
}

/// Networking layer contract.
///
/// # Contract
///
/// - `join_conversation` returns `true` iff the caller may now rely on the
///   message/event feeds for that conversation.
/// - `leave_conversation` is best-effort; callers cancel their local feed
///   handles before calling it.
/// - `send_message` must echo `client_id` unchanged on the corresponding
///   message-feed entry when the send is accepted.
/// - `start_typing` / `stop_typing` are fire-and-forget for the caller.
pub trait Transport: Send + Sync + 'static {
    /// Fetch the conversation list.
    fn fetch_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, TransportError>> + Send;

    /// Fetch one page of history older than `before` (newest page if `None`).
    fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        before: Option<String>,
    ) -> impl Future<Output = Result<MessagePage, TransportError>> + Send;

    /// Ask to join a conversation's live feeds.
    fn join_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Leave a conversation's live feeds.
    fn leave_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open a message feed handle.
    fn message_stream(&self, conversation_id: &ConversationId) -> MessageStream;

    /// Open an event feed handle.
    fn event_stream(&self, conversation_id: &ConversationId) -> EventStream;

    /// Send a message.
    fn send_message(
        &self,
        message: OutgoingMessage,
    ) -> impl Future<Output = Result<SendReceipt, TransportError>> + Send;

    /// Mark a conversation read up to `message_id`.
    fn mark_as_read(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Add a reaction.
    fn add_reaction(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        emoji: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Remove a reaction.
    fn remove_reaction(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        emoji: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Signal that the local user is typing.
    fn start_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Signal that the local user stopped typing.
    fn stop_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
