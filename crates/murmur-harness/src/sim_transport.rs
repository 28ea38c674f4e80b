//! Scriptable in-memory transport.
//!
//! `SimTransport` stands in for the networking layer. Every call is recorded
//! as a [`TransportCall`], results are scripted per test, and feeds are
//! in-memory channels that tests push into. Clones share the same backend.
//!
//! With echo enabled, an accepted send is delivered back on the message feeds
//! of its conversation carrying a server id and the caller's client id, the
//! way a real backend echoes own messages.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{StreamExt, channel::mpsc};
use murmur_core::{
    Environment, EventStream, MessageStream, OutgoingMessage, SendReceipt, Transport,
    TransportError,
};
use murmur_proto::{
    Conversation, ConversationId, Message, MessageId, MessagePage, RawEvent, UserId,
};

use crate::SimEnv;

/// A call made against [`SimTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `fetch_conversations`
    FetchConversations,
    /// `fetch_messages`
    FetchMessages {
        /// Paged conversation.
        conversation_id: ConversationId,
        /// Cursor passed.
        before: Option<String>,
    },
    /// `join_conversation`
    Join(ConversationId),
    /// `leave_conversation`
    Leave(ConversationId),
    /// `message_stream`
    OpenMessageFeed(ConversationId),
    /// `event_stream`
    OpenEventFeed(ConversationId),
    /// `send_message`
    Send(OutgoingMessage),
    /// `mark_as_read`
    MarkAsRead {
        /// Marked conversation.
        conversation_id: ConversationId,
        /// Last read message.
        message_id: MessageId,
    },
    /// `add_reaction`
    AddReaction {
        /// Reacted message.
        message_id: MessageId,
        /// Emoji.
        emoji: String,
    },
    /// `remove_reaction`
    RemoveReaction {
        /// Reacted message.
        message_id: MessageId,
        /// Emoji.
        emoji: String,
    },
    /// `start_typing`
    StartTyping(ConversationId),
    /// `stop_typing`
    StopTyping(ConversationId),
}

impl TransportCall {
    /// True for `start_typing` / `stop_typing` calls.
    pub fn is_typing(&self) -> bool {
        matches!(self, Self::StartTyping(_) | Self::StopTyping(_))
    }
}

struct Echo {
    env: SimEnv,
    sender_id: UserId,
}

#[derive(Default)]
struct Backend {
    calls: Vec<TransportCall>,
    conversations: Vec<Conversation>,
    conversations_error: Option<TransportError>,
    history: HashMap<ConversationId, VecDeque<MessagePage>>,
    refused_joins: HashSet<ConversationId>,
    refuse_sends: bool,
    send_error: Option<TransportError>,
    mark_read_error: Option<TransportError>,
    reaction_error: Option<TransportError>,
    typing_error: Option<TransportError>,
    latency: Duration,
    echo: Option<Echo>,
    next_server_id: u64,
    message_feeds: HashMap<ConversationId, Vec<mpsc::UnboundedSender<Message>>>,
    event_feeds: HashMap<ConversationId, Vec<mpsc::UnboundedSender<RawEvent>>>,
}

impl Backend {
    fn deliver_message(&mut self, conversation_id: &ConversationId, message: &Message) -> usize {
        let Some(feeds) = self.message_feeds.get_mut(conversation_id) else {
            return 0;
        };
        feeds.retain(|tx| tx.unbounded_send(message.clone()).is_ok());
        feeds.len()
    }

    fn deliver_event(&mut self, conversation_id: &ConversationId, event: &RawEvent) -> usize {
        let Some(feeds) = self.event_feeds.get_mut(conversation_id) else {
            return 0;
        };
        feeds.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        feeds.len()
    }
}

/// In-memory transport for deterministic tests.
#[derive(Clone, Default)]
pub struct SimTransport {
    backend: Arc<Mutex<Backend>>,
}

impl std::fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTransport").field("calls", &self.lock().calls.len()).finish()
    }
}

impl SimTransport {
    /// Create a backend that accepts everything and never echoes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo accepted sends on the message feed, stamped by `env`.
    #[must_use]
    pub fn with_echo(self, env: SimEnv, sender_id: impl Into<UserId>) -> Self {
        self.lock().echo = Some(Echo { env, sender_id: sender_id.into() });
        self
    }

    /// Delay every request/response call by `latency` of virtual time.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Conversation list served by `fetch_conversations`.
    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        let mut backend = self.lock();
        backend.conversations = conversations;
        backend.conversations_error = None;
    }

    /// Make `fetch_conversations` fail.
    pub fn fail_conversations(&self, error: TransportError) {
        self.lock().conversations_error = Some(error);
    }

    /// Queue a history page for `fetch_messages`.
    ///
    /// Pages are served in the order queued; an exhausted queue serves an
    /// empty final page.
    pub fn push_history(&self, conversation_id: impl Into<ConversationId>, page: MessagePage) {
        self.lock().history.entry(conversation_id.into()).or_default().push_back(page);
    }

    /// Make `join_conversation` return `false` for this conversation.
    pub fn refuse_join(&self, conversation_id: impl Into<ConversationId>) {
        self.lock().refused_joins.insert(conversation_id.into());
    }

    /// Make `send_message` reply `is_ok: false`.
    pub fn refuse_sends(&self, refuse: bool) {
        self.lock().refuse_sends = refuse;
    }

    /// Make `send_message` fail with `error` (`None` restores success).
    pub fn fail_sends(&self, error: Option<TransportError>) {
        self.lock().send_error = error;
    }

    /// Make `mark_as_read` fail with `error`.
    pub fn fail_mark_read(&self, error: Option<TransportError>) {
        self.lock().mark_read_error = error;
    }

    /// Make reaction calls fail with `error`.
    pub fn fail_reactions(&self, error: Option<TransportError>) {
        self.lock().reaction_error = error;
    }

    /// Make typing calls fail with `error`.
    pub fn fail_typing(&self, error: Option<TransportError>) {
        self.lock().typing_error = error;
    }

    /// Push a message onto every open message feed of the conversation.
    ///
    /// Returns the number of feeds that received it.
    pub fn push_message(&self, conversation_id: impl Into<ConversationId>, message: Message) -> usize {
        self.lock().deliver_message(&conversation_id.into(), &message)
    }

    /// Push an event onto every open event feed of the conversation.
    ///
    /// Returns the number of feeds that received it.
    pub fn push_event(&self, conversation_id: impl Into<ConversationId>, event: RawEvent) -> usize {
        self.lock().deliver_event(&conversation_id.into(), &event)
    }

    /// Number of feed handles (message + event) still open for a conversation.
    pub fn open_feeds(&self, conversation_id: &ConversationId) -> usize {
        let backend = self.lock();
        let messages = backend.message_feeds.get(conversation_id).map_or(0, |feeds| {
            feeds.iter().filter(|tx| !tx.is_closed()).count()
        });
        let events = backend
            .event_feeds
            .get(conversation_id)
            .map_or(0, |feeds| feeds.iter().filter(|tx| !tx.is_closed()).count());
        messages + events
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Typing calls made so far, in order.
    pub fn typing_calls(&self) -> Vec<TransportCall> {
        self.lock().calls.iter().filter(|c| c.is_typing()).cloned().collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: TransportCall) -> Duration {
        let mut backend = self.lock();
        tracing::trace!(?call, "sim transport call");
        backend.calls.push(call);
        backend.latency
    }

    async fn delay(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Transport for SimTransport {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, TransportError> {
        Self::delay(self.record(TransportCall::FetchConversations)).await;
        let backend = self.lock();
        match &backend.conversations_error {
            Some(e) => Err(e.clone()),
            None => Ok(backend.conversations.clone()),
        }
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        before: Option<String>,
    ) -> Result<MessagePage, TransportError> {
        let call = TransportCall::FetchMessages { conversation_id: conversation_id.clone(), before };
        Self::delay(self.record(call)).await;
        let page = self.lock().history.get_mut(conversation_id).and_then(VecDeque::pop_front);
        Ok(page.unwrap_or_default())
    }

    async fn join_conversation(&self, conversation_id: &ConversationId) -> Result<bool, TransportError> {
        Self::delay(self.record(TransportCall::Join(conversation_id.clone()))).await;
        Ok(!self.lock().refused_joins.contains(conversation_id))
    }

    async fn leave_conversation(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        Self::delay(self.record(TransportCall::Leave(conversation_id.clone()))).await;
        Ok(())
    }

    fn message_stream(&self, conversation_id: &ConversationId) -> MessageStream {
        self.record(TransportCall::OpenMessageFeed(conversation_id.clone()));
        let (tx, rx) = mpsc::unbounded();
        self.lock().message_feeds.entry(conversation_id.clone()).or_default().push(tx);
        rx.boxed()
    }

    fn event_stream(&self, conversation_id: &ConversationId) -> EventStream {
        self.record(TransportCall::OpenEventFeed(conversation_id.clone()));
        let (tx, rx) = mpsc::unbounded();
        self.lock().event_feeds.entry(conversation_id.clone()).or_default().push(tx);
        rx.boxed()
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<SendReceipt, TransportError> {
        Self::delay(self.record(TransportCall::Send(message.clone()))).await;

        let mut backend = self.lock();
        if let Some(e) = &backend.send_error {
            return Err(e.clone());
        }
        if backend.refuse_sends {
            return Ok(SendReceipt::FAILED);
        }

        let Some(echo) = &backend.echo else {
            return Ok(SendReceipt::OK);
        };
        let created_at = echo.env.wall_clock();
        let sender_id = echo.sender_id.clone();

        backend.next_server_id += 1;
        let id = MessageId::new(format!("srv-{}", backend.next_server_id));
        let mut confirmed =
            Message::confirmed(id, message.conversation_id.clone(), sender_id, message.content, created_at)
                .with_client_id(message.client_id);
        confirmed.message_type = message.message_type;
        confirmed.reply_to = message.reply_to;
        backend.deliver_message(&message.conversation_id, &confirmed);
        Ok(SendReceipt::OK)
    }

    async fn mark_as_read(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<(), TransportError> {
        let call = TransportCall::MarkAsRead {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
        };
        Self::delay(self.record(call)).await;
        self.lock().mark_read_error.clone().map_or(Ok(()), Err)
    }

    async fn add_reaction(
        &self,
        _conversation_id: &ConversationId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let call = TransportCall::AddReaction { message_id: message_id.clone(), emoji: emoji.to_owned() };
        Self::delay(self.record(call)).await;
        self.lock().reaction_error.clone().map_or(Ok(()), Err)
    }

    async fn remove_reaction(
        &self,
        _conversation_id: &ConversationId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let call =
            TransportCall::RemoveReaction { message_id: message_id.clone(), emoji: emoji.to_owned() };
        Self::delay(self.record(call)).await;
        self.lock().reaction_error.clone().map_or(Ok(()), Err)
    }

    async fn start_typing(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        Self::delay(self.record(TransportCall::StartTyping(conversation_id.clone()))).await;
        self.lock().typing_error.clone().map_or(Ok(()), Err)
    }

    async fn stop_typing(&self, conversation_id: &ConversationId) -> Result<(), TransportError> {
        Self::delay(self.record(TransportCall::StopTyping(conversation_id.clone()))).await;
        self.lock().typing_error.clone().map_or(Ok(()), Err)
    }
}
