//! Conversation synchronization state machine.
//!
//! [`ConversationSync`] owns the conversation list, the per-conversation
//! message collections, unread counters and the active conversation. It
//! consumes [`SyncEvent`]s and produces [`SyncAction`]s; the runtime executes
//! the actions and feeds transport results back in as follow-up events.
//!
//! # Responsibilities
//!
//! - Optimistic sends: a pending copy is inserted before the transport call,
//!   then reconciled with the server echo or flagged as failed.
//! - Join/leave lifecycle: subscriptions open only after an accepted join and
//!   are closed before the leave call.
//! - Edit and delete events from the event feed, ignoring unknown ids.
//!
//! # Snapshots
//!
//! The state lives behind an `Arc`. Each mutation goes through
//! `Arc::make_mut`, so a published snapshot is never modified afterwards.

mod event;
mod state;

use std::{collections::HashSet, sync::Arc};

pub use event::{SyncAction, SyncEvent};
use murmur_core::{Environment, OutgoingMessage};
use murmur_proto::{
    ClientId, Conversation, ConversationId, FeedEvent, Message, MessageId, MessagePage,
    MessageType, RawEvent, UserId,
};
pub use state::{ConversationSyncState, HistoryCursor, SyncStatus};

use crate::{SyncError, reconcile};

/// Conversation sync state machine.
///
/// Pure state machine: all I/O is expressed as [`SyncAction`]s, and the only
/// environment access is the wall clock used to stamp optimistic messages.
#[derive(Debug)]
pub struct ConversationSync<E: Environment> {
    env: E,
    /// Sender stamped on optimistic messages.
    user_id: UserId,
    state: Arc<ConversationSyncState>,
    /// Conversations with an accepted join and open subscriptions.
    joined: HashSet<ConversationId>,
    /// Per-instance sequence for client id generation.
    next_sequence: u64,
    shut_down: bool,
}

impl<E: Environment> ConversationSync<E> {
    /// Create a state machine for the given local user.
    pub fn new(env: E, user_id: impl Into<UserId>) -> Self {
        Self {
            env,
            user_id: user_id.into(),
            state: Arc::new(ConversationSyncState::default()),
            joined: HashSet::new(),
            next_sequence: 0,
            shut_down: false,
        }
    }

    /// Process an event and return actions.
    ///
    /// # Errors
    ///
    /// - [`SyncError::EmptyConversationId`] / [`SyncError::EmptyContent`] when
    ///   an intent fails validation (state is untouched)
    /// - [`SyncError::ShutDown`] for anything but `Shutdown` after shutdown
    pub fn handle(&mut self, event: SyncEvent) -> Result<Vec<SyncAction>, SyncError> {
        if self.shut_down {
            return match event {
                SyncEvent::Shutdown => Ok(Vec::new()),
                _ => Err(SyncError::ShutDown),
            };
        }

        match event {
            SyncEvent::LoadConversations => Ok(self.load_conversations()),
            SyncEvent::ConversationsLoaded { conversations } => {
                Ok(self.conversations_loaded(conversations))
            },
            SyncEvent::ConversationsFailed { reason } => Ok(self.conversations_failed(reason)),
            SyncEvent::JoinConversation { conversation_id } => self.join(conversation_id),
            SyncEvent::JoinCompleted { conversation_id, accepted } => {
                Ok(self.join_completed(conversation_id, accepted))
            },
            SyncEvent::LeaveConversation { conversation_id } => self.leave(conversation_id),
            SyncEvent::SendMessage { conversation_id, content, message_type, reply_to } => {
                self.send(conversation_id, content, message_type, reply_to)
            },
            SyncEvent::SendCompleted { conversation_id, client_id, is_ok } => {
                Ok(self.send_completed(&conversation_id, &client_id, is_ok))
            },
            SyncEvent::RetryMessage { conversation_id, client_id } => {
                Ok(self.retry(&conversation_id, &client_id))
            },
            SyncEvent::MarkAsRead { conversation_id, message_id } => {
                require_id(&conversation_id)?;
                Ok(vec![SyncAction::MarkAsRead { conversation_id, message_id }])
            },
            SyncEvent::MarkReadCompleted { conversation_id } => {
                Ok(self.clear_unread(&conversation_id))
            },
            SyncEvent::AddReaction { conversation_id, message_id, emoji } => {
                require_id(&conversation_id)?;
                Ok(vec![SyncAction::AddReaction { conversation_id, message_id, emoji }])
            },
            SyncEvent::RemoveReaction { conversation_id, message_id, emoji } => {
                require_id(&conversation_id)?;
                Ok(vec![SyncAction::RemoveReaction { conversation_id, message_id, emoji }])
            },
            SyncEvent::MessageReceived { conversation_id, message } => {
                Ok(self.message_received(conversation_id, message))
            },
            SyncEvent::EventReceived { conversation_id, event } => {
                Ok(self.event_received(conversation_id, &event))
            },
            SyncEvent::MessageEdited { conversation_id, message_id, content } => {
                Ok(self.message_edited(&conversation_id, &message_id, content))
            },
            SyncEvent::MessageDeleted { conversation_id, message_id } => {
                Ok(self.message_deleted(&conversation_id, &message_id))
            },
            SyncEvent::LoadHistory { conversation_id } => self.load_history(conversation_id),
            SyncEvent::HistoryLoaded { conversation_id, page } => {
                Ok(self.history_loaded(conversation_id, page))
            },
            SyncEvent::HistoryFailed { conversation_id, reason } => {
                tracing::warn!(%conversation_id, %reason, "history fetch failed");
                Ok(self.set_error(reason))
            },
            SyncEvent::SetActiveConversation { conversation_id } => {
                Ok(self.set_active(conversation_id))
            },
            SyncEvent::ClearError => Ok(self.clear_error()),
            SyncEvent::Shutdown => Ok(self.shutdown()),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> &Arc<ConversationSyncState> {
        &self.state
    }

    /// True if the conversation has an accepted join.
    pub fn is_joined(&self, conversation_id: &ConversationId) -> bool {
        self.joined.contains(conversation_id)
    }

    /// True once `Shutdown` has been processed.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn load_conversations(&mut self) -> Vec<SyncAction> {
        self.state_mut().status = SyncStatus::Loading;
        vec![self.publish(), SyncAction::FetchConversations]
    }

    fn conversations_loaded(&mut self, conversations: Vec<Conversation>) -> Vec<SyncAction> {
        tracing::debug!(count = conversations.len(), "conversations loaded");
        let state = self.state_mut();
        state.status = SyncStatus::Loaded;
        state.conversations = conversations;
        vec![self.publish()]
    }

    fn conversations_failed(&mut self, reason: String) -> Vec<SyncAction> {
        tracing::warn!(%reason, "conversation list fetch failed");
        let state = self.state_mut();
        state.status = SyncStatus::Error;
        state.last_error = Some(reason);
        vec![self.publish()]
    }

    fn join(&mut self, conversation_id: ConversationId) -> Result<Vec<SyncAction>, SyncError> {
        require_id(&conversation_id)?;

        if self.joined.contains(&conversation_id) {
            tracing::debug!(%conversation_id, "already joined");
            return Ok(self.set_active(Some(conversation_id)));
        }

        Ok(vec![SyncAction::Join { conversation_id }])
    }

    fn join_completed(&mut self, conversation_id: ConversationId, accepted: bool) -> Vec<SyncAction> {
        if !accepted {
            tracing::warn!(%conversation_id, "join refused");
            return Vec::new();
        }

        tracing::info!(%conversation_id, "joined conversation");
        self.joined.insert(conversation_id.clone());
        self.state_mut().active_conversation = Some(conversation_id.clone());
        vec![SyncAction::OpenSubscriptions { conversation_id }, self.publish()]
    }

    fn leave(&mut self, conversation_id: ConversationId) -> Result<Vec<SyncAction>, SyncError> {
        require_id(&conversation_id)?;

        let was_joined = self.joined.remove(&conversation_id);
        let mut actions = Vec::new();
        if was_joined {
            actions.push(SyncAction::CloseSubscriptions { conversation_id: conversation_id.clone() });
        }

        if self.state.active_conversation.as_ref() == Some(&conversation_id) {
            self.state_mut().active_conversation = None;
            actions.push(self.publish());
        }

        if was_joined {
            tracing::info!(%conversation_id, "leaving conversation");
            actions.push(SyncAction::Leave { conversation_id });
        }
        Ok(actions)
    }

    fn send(
        &mut self,
        conversation_id: ConversationId,
        content: String,
        message_type: MessageType,
        reply_to: Option<MessageId>,
    ) -> Result<Vec<SyncAction>, SyncError> {
        require_id(&conversation_id)?;
        if content.is_empty() {
            return Err(SyncError::EmptyContent);
        }

        let created_at = self.env.wall_clock();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let client_id = ClientId::generate(created_at.timestamp_millis(), sequence);

        let message = Message::optimistic(
            conversation_id.clone(),
            self.user_id.clone(),
            client_id.clone(),
            message_type,
            content.clone(),
            reply_to.clone(),
            created_at,
        );

        tracing::debug!(%conversation_id, %client_id, "inserting optimistic message");
        let messages = self.state_mut().messages.entry(conversation_id.clone()).or_default();
        reconcile::insert_sorted(messages, message);

        let outgoing = OutgoingMessage { conversation_id, content, message_type, reply_to, client_id };
        Ok(vec![self.publish(), SyncAction::Send(outgoing)])
    }

    fn send_completed(
        &mut self,
        conversation_id: &ConversationId,
        client_id: &ClientId,
        is_ok: bool,
    ) -> Vec<SyncAction> {
        if is_ok {
            return Vec::new();
        }

        let Some(index) = reconcile::pending_position(self.state.messages(conversation_id), client_id)
        else {
            tracing::debug!(%conversation_id, %client_id, "send failed after reconciliation, ignoring");
            return Vec::new();
        };

        tracing::warn!(%conversation_id, %client_id, "send failed");
        if let Some(message) = self.message_at_mut(conversation_id, index) {
            message.is_pending = false;
            message.has_failed = true;
        }
        vec![self.publish()]
    }

    fn retry(&mut self, conversation_id: &ConversationId, client_id: &ClientId) -> Vec<SyncAction> {
        let index = self
            .state
            .messages(conversation_id)
            .iter()
            .position(|m| m.has_failed && m.client_id.as_ref() == Some(client_id));
        let Some(index) = index else {
            return Vec::new();
        };

        let Some(message) = self.message_at_mut(conversation_id, index) else {
            return Vec::new();
        };
        message.is_pending = true;
        message.has_failed = false;

        let outgoing = OutgoingMessage {
            conversation_id: conversation_id.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            reply_to: message.reply_to.clone(),
            client_id: client_id.clone(),
        };

        tracing::debug!(%conversation_id, %client_id, "retrying send");
        vec![self.publish(), SyncAction::Send(outgoing)]
    }

    fn clear_unread(&mut self, conversation_id: &ConversationId) -> Vec<SyncAction> {
        if !self.state.unread.contains_key(conversation_id) {
            return Vec::new();
        }

        self.state_mut().unread.remove(conversation_id);
        vec![self.publish()]
    }

    fn message_received(&mut self, conversation_id: ConversationId, message: Message) -> Vec<SyncAction> {
        let is_active = self.state.active_conversation.as_ref() == Some(&conversation_id);
        let state = self.state_mut();

        let messages = state.messages.entry(conversation_id.clone()).or_default();
        let merge = reconcile::merge_incoming(messages, message);
        tracing::debug!(%conversation_id, ?merge, "message received");

        // Redeliveries and full-message updates are not new messages.
        if !is_active && merge != reconcile::Merge::Replaced {
            *state.unread.entry(conversation_id).or_insert(0) += 1;
        }
        vec![self.publish()]
    }

    fn event_received(&mut self, conversation_id: ConversationId, event: &RawEvent) -> Vec<SyncAction> {
        match FeedEvent::decode(event) {
            Ok(FeedEvent::MessageEdited { message_id, content }) => {
                self.message_edited(&conversation_id, &message_id, content)
            },
            Ok(FeedEvent::MessageDeleted { message_id }) => {
                self.message_deleted(&conversation_id, &message_id)
            },
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!(%conversation_id, error = %e, "dropping malformed feed event");
                Vec::new()
            },
        }
    }

    fn message_edited(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        content: String,
    ) -> Vec<SyncAction> {
        let Some(index) = reconcile::position_by_server_id(self.state.messages(conversation_id), message_id)
        else {
            tracing::debug!(%conversation_id, %message_id, "edit for unknown message");
            return Vec::new();
        };

        if let Some(message) = self.message_at_mut(conversation_id, index) {
            message.content = content;
            message.is_edited = true;
        }
        vec![self.publish()]
    }

    fn message_deleted(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Vec<SyncAction> {
        let Some(index) = reconcile::position_by_server_id(self.state.messages(conversation_id), message_id)
        else {
            tracing::debug!(%conversation_id, %message_id, "delete for unknown message");
            return Vec::new();
        };

        if let Some(message) = self.message_at_mut(conversation_id, index) {
            message.is_deleted = true;
        }
        vec![self.publish()]
    }

    fn load_history(&mut self, conversation_id: ConversationId) -> Result<Vec<SyncAction>, SyncError> {
        require_id(&conversation_id)?;

        let cursor = self.state.history_cursor(&conversation_id);
        if !cursor.has_more {
            tracing::debug!(%conversation_id, "history exhausted");
            return Ok(Vec::new());
        }

        Ok(vec![SyncAction::FetchHistory { conversation_id, before: cursor.cursor }])
    }

    fn history_loaded(&mut self, conversation_id: ConversationId, page: MessagePage) -> Vec<SyncAction> {
        tracing::debug!(
            %conversation_id,
            count = page.messages.len(),
            has_more = page.has_more,
            "history page loaded"
        );
        let state = self.state_mut();

        let messages = state.messages.entry(conversation_id.clone()).or_default();
        for message in page.messages {
            reconcile::merge_incoming(messages, message);
        }
        state.history.insert(conversation_id, HistoryCursor { cursor: page.cursor, has_more: page.has_more });
        vec![self.publish()]
    }

    fn set_active(&mut self, conversation_id: Option<ConversationId>) -> Vec<SyncAction> {
        if self.state.active_conversation == conversation_id {
            return Vec::new();
        }

        self.state_mut().active_conversation = conversation_id;
        vec![self.publish()]
    }

    fn set_error(&mut self, reason: String) -> Vec<SyncAction> {
        self.state_mut().last_error = Some(reason);
        vec![self.publish()]
    }

    fn clear_error(&mut self) -> Vec<SyncAction> {
        if self.state.last_error.is_none() {
            return Vec::new();
        }

        self.state_mut().last_error = None;
        vec![self.publish()]
    }

    fn shutdown(&mut self) -> Vec<SyncAction> {
        tracing::info!(joined = self.joined.len(), "conversation sync shutting down");
        self.shut_down = true;
        self.joined.clear();
        vec![SyncAction::CloseAllSubscriptions]
    }

    fn state_mut(&mut self) -> &mut ConversationSyncState {
        Arc::make_mut(&mut self.state)
    }

    fn message_at_mut(&mut self, conversation_id: &ConversationId, index: usize) -> Option<&mut Message> {
        self.state_mut().messages.get_mut(conversation_id).and_then(|m| m.get_mut(index))
    }

    fn publish(&mut self) -> SyncAction {
        self.state_mut().version += 1;
        SyncAction::Publish(Arc::clone(&self.state))
    }
}

fn require_id(conversation_id: &ConversationId) -> Result<(), SyncError> {
    if conversation_id.is_empty() {
        return Err(SyncError::EmptyConversationId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::{
            Arc,
            atomic::{AtomicI64, Ordering},
        },
        time::Duration,
    };

    use chrono::{DateTime, TimeZone, Utc};
    use murmur_proto::Reaction;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct TestEnv {
        wall_millis: Arc<AtomicI64>,
    }

    impl TestEnv {
        fn set_wall(&self, millis: i64) {
            self.wall_millis.store(millis, Ordering::SeqCst);
        }
    }

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.wall_millis.load(Ordering::SeqCst)).unwrap()
        }
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn sync() -> ConversationSync<TestEnv> {
        ConversationSync::new(TestEnv::default(), "alice")
    }

    fn joined(conversation_id: &str) -> ConversationSync<TestEnv> {
        let mut sync = sync();
        sync.handle(SyncEvent::JoinCompleted { conversation_id: conversation_id.into(), accepted: true })
            .unwrap();
        sync
    }

    fn send(sync: &mut ConversationSync<TestEnv>, conversation_id: &str, content: &str) -> ClientId {
        let actions = sync
            .handle(SyncEvent::SendMessage {
                conversation_id: conversation_id.into(),
                content: content.into(),
                message_type: MessageType::Text,
                reply_to: None,
            })
            .unwrap();
        actions
            .into_iter()
            .find_map(|a| match a {
                SyncAction::Send(outgoing) => Some(outgoing.client_id),
                _ => None,
            })
            .unwrap()
    }

    fn deliver(sync: &mut ConversationSync<TestEnv>, message: Message) -> Vec<SyncAction> {
        let conversation_id = message.conversation_id.clone();
        sync.handle(SyncEvent::MessageReceived { conversation_id, message }).unwrap()
    }

    #[test]
    fn join_waits_for_transport_before_subscribing() {
        let mut sync = sync();
        let actions = sync.handle(SyncEvent::JoinConversation { conversation_id: "c1".into() }).unwrap();
        assert_eq!(actions, vec![SyncAction::Join { conversation_id: "c1".into() }]);
        assert!(!sync.is_joined(&"c1".into()));

        let actions = sync
            .handle(SyncEvent::JoinCompleted { conversation_id: "c1".into(), accepted: true })
            .unwrap();
        assert!(matches!(actions[0], SyncAction::OpenSubscriptions { .. }));
        assert_eq!(sync.state().active_conversation, Some("c1".into()));
    }

    #[test]
    fn refused_join_changes_nothing() {
        let mut sync = sync();
        let before = Arc::clone(sync.state());
        let actions = sync
            .handle(SyncEvent::JoinCompleted { conversation_id: "c1".into(), accepted: false })
            .unwrap();

        assert!(actions.is_empty());
        assert_eq!(sync.state(), &before);
        assert!(!sync.is_joined(&"c1".into()));
    }

    #[test]
    fn duplicate_join_does_not_rejoin() {
        let mut sync = joined("c1");
        let actions = sync.handle(SyncEvent::JoinConversation { conversation_id: "c1".into() }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_ids_are_rejected() {
        let mut sync = sync();
        let result = sync.handle(SyncEvent::JoinConversation { conversation_id: "".into() });
        assert_eq!(result, Err(SyncError::EmptyConversationId));

        let result = sync.handle(SyncEvent::SendMessage {
            conversation_id: "c1".into(),
            content: String::new(),
            message_type: MessageType::Text,
            reply_to: None,
        });
        assert_eq!(result, Err(SyncError::EmptyContent));
        assert_eq!(sync.state().version, 0);
    }

    #[test]
    fn leave_closes_subscriptions_before_transport_call() {
        let mut sync = joined("c1");
        let actions = sync.handle(SyncEvent::LeaveConversation { conversation_id: "c1".into() }).unwrap();

        assert!(matches!(actions.first(), Some(SyncAction::CloseSubscriptions { .. })));
        assert!(matches!(actions.last(), Some(SyncAction::Leave { .. })));
        assert_eq!(sync.state().active_conversation, None);

        let actions = sync.handle(SyncEvent::LeaveConversation { conversation_id: "c1".into() }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn send_inserts_pending_message_then_calls_transport() {
        let mut sync = joined("c1");
        sync.env.set_wall(1_000);
        let client_id = send(&mut sync, "c1", "hi");

        assert_eq!(client_id.as_str(), "1000-0");
        let messages = sync.state().messages(&"c1".into());
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_pending);
        assert_eq!(messages[0].sender_id, UserId::from("alice"));
        assert_eq!(messages[0].created_at, at(1_000));
    }

    #[test]
    fn sends_in_same_millisecond_get_distinct_client_ids() {
        let mut sync = joined("c1");
        let a = send(&mut sync, "c1", "one");
        let b = send(&mut sync, "c1", "two");
        assert_ne!(a, b);
    }

    #[test]
    fn failed_send_is_flagged_and_retained() {
        let mut sync = joined("c1");
        let client_id = send(&mut sync, "c1", "hi");

        sync.handle(SyncEvent::SendCompleted {
            conversation_id: "c1".into(),
            client_id: client_id.clone(),
            is_ok: false,
        })
        .unwrap();

        let message = sync.state().find_by_client_id(&"c1".into(), &client_id).unwrap();
        assert!(!message.is_pending);
        assert!(message.has_failed);
    }

    #[test]
    fn late_failure_after_echo_is_ignored() {
        let mut sync = joined("c1");
        let client_id = send(&mut sync, "c1", "hi");

        deliver(&mut sync, Message::confirmed("m1".into(), "c1".into(), "alice".into(), "hi", at(5)).with_client_id(client_id.clone()));
        let actions = sync
            .handle(SyncEvent::SendCompleted { conversation_id: "c1".into(), client_id, is_ok: false })
            .unwrap();

        assert!(actions.is_empty());
        let messages = sync.state().messages(&"c1".into());
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].has_failed);
        assert_eq!(messages[0].id, Some("m1".into()));
    }

    #[test]
    fn retry_resends_with_same_client_id() {
        let mut sync = joined("c1");
        let client_id = send(&mut sync, "c1", "hi");
        sync.handle(SyncEvent::SendCompleted {
            conversation_id: "c1".into(),
            client_id: client_id.clone(),
            is_ok: false,
        })
        .unwrap();

        let actions = sync
            .handle(SyncEvent::RetryMessage { conversation_id: "c1".into(), client_id: client_id.clone() })
            .unwrap();

        let resent = actions.iter().find_map(|a| match a {
            SyncAction::Send(outgoing) => Some(outgoing.clone()),
            _ => None,
        });
        assert_eq!(resent.map(|o| o.client_id), Some(client_id.clone()));
        let message = sync.state().find_by_client_id(&"c1".into(), &client_id).unwrap();
        assert!(message.is_pending);
        assert!(!message.has_failed);
    }

    #[test]
    fn retry_of_pending_message_is_noop() {
        let mut sync = joined("c1");
        let client_id = send(&mut sync, "c1", "hi");
        let actions =
            sync.handle(SyncEvent::RetryMessage { conversation_id: "c1".into(), client_id }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn unread_only_counts_inactive_conversations() {
        let mut sync = joined("c1");
        deliver(&mut sync, Message::confirmed("m1".into(), "c1".into(), "bob".into(), "a", at(1)));
        deliver(&mut sync, Message::confirmed("m2".into(), "c2".into(), "bob".into(), "b", at(2)));
        deliver(&mut sync, Message::confirmed("m3".into(), "c2".into(), "bob".into(), "c", at(3)));

        assert_eq!(sync.state().unread_count(&"c1".into()), 0);
        assert_eq!(sync.state().unread_count(&"c2".into()), 2);

        sync.handle(SyncEvent::MarkReadCompleted { conversation_id: "c2".into() }).unwrap();
        assert_eq!(sync.state().unread_count(&"c2".into()), 0);
        assert!(!sync.state().unread.contains_key(&ConversationId::from("c2")));
    }

    #[test]
    fn redelivery_and_reaction_update_do_not_count_as_unread() {
        let mut sync = joined("c1");
        let original = Message::confirmed("m1".into(), "c2".into(), "bob".into(), "a", at(1));
        deliver(&mut sync, original.clone());
        deliver(&mut sync, original.clone());

        let mut reacted = original;
        reacted.reactions =
            vec![Reaction { emoji: "👍".into(), user_ids: vec!["carol".into()], count: 1 }];
        let actions = deliver(&mut sync, reacted);

        assert!(matches!(actions.as_slice(), [SyncAction::Publish(_)]));
        assert_eq!(sync.state().messages(&"c2".into()).len(), 1);
        assert_eq!(sync.state().messages(&"c2".into())[0].reactions.len(), 1);
        assert_eq!(sync.state().unread_count(&"c2".into()), 1);
    }

    #[test]
    fn set_active_does_not_clear_unread() {
        let mut sync = sync();
        deliver(&mut sync, Message::confirmed("m1".into(), "c2".into(), "bob".into(), "a", at(1)));
        sync.handle(SyncEvent::SetActiveConversation { conversation_id: Some("c2".into()) }).unwrap();
        assert_eq!(sync.state().unread_count(&"c2".into()), 1);
    }

    #[test]
    fn edit_and_delete_events_mutate_in_place() {
        let mut sync = joined("c1");
        deliver(&mut sync, Message::confirmed("m1".into(), "c1".into(), "bob".into(), "old", at(1)));

        let edit = RawEvent::new("message_edited", json!({ "messageId": "m1", "content": "new" }));
        sync.handle(SyncEvent::EventReceived { conversation_id: "c1".into(), event: edit }).unwrap();
        let delete = RawEvent::new("message_deleted", json!({ "messageId": "m1" }));
        sync.handle(SyncEvent::EventReceived { conversation_id: "c1".into(), event: delete }).unwrap();

        let messages = sync.state().messages(&"c1".into());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "new");
        assert!(messages[0].is_edited);
        assert!(messages[0].is_deleted);
    }

    #[test]
    fn typing_and_malformed_events_are_ignored() {
        let mut sync = joined("c1");
        let version = sync.state().version;

        for event in [
            RawEvent::new("typing_start", json!({ "userId": "bob" })),
            RawEvent::new("message_deleted", json!({ "wrong": 1 })),
            RawEvent::new("something_else", json!({})),
        ] {
            let actions = sync.handle(SyncEvent::EventReceived { conversation_id: "c1".into(), event }).unwrap();
            assert!(actions.is_empty());
        }
        assert_eq!(sync.state().version, version);
    }

    #[test]
    fn load_failure_keeps_list() {
        let mut sync = sync();
        sync.handle(SyncEvent::LoadConversations).unwrap();
        assert_eq!(sync.state().status, SyncStatus::Loading);
        sync.handle(SyncEvent::ConversationsLoaded { conversations: vec![Conversation::new("c1")] })
            .unwrap();

        sync.handle(SyncEvent::LoadConversations).unwrap();
        sync.handle(SyncEvent::ConversationsFailed { reason: "offline".into() }).unwrap();

        let state = sync.state();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("offline"));
        assert_eq!(state.conversations.len(), 1);

        sync.handle(SyncEvent::ClearError).unwrap();
        assert_eq!(sync.state().last_error, None);
    }

    #[test]
    fn history_merges_without_unread_and_stops_when_exhausted() {
        let mut sync = sync();
        let actions = sync.handle(SyncEvent::LoadHistory { conversation_id: "c1".into() }).unwrap();
        assert_eq!(actions, vec![SyncAction::FetchHistory { conversation_id: "c1".into(), before: None }]);

        let page = MessagePage {
            messages: vec![
                Message::confirmed("m2".into(), "c1".into(), "bob".into(), "b", at(2)),
                Message::confirmed("m1".into(), "c1".into(), "bob".into(), "a", at(1)),
            ],
            has_more: false,
            cursor: None,
        };
        sync.handle(SyncEvent::HistoryLoaded { conversation_id: "c1".into(), page }).unwrap();

        assert!(reconcile::is_sorted(sync.state().messages(&"c1".into())));
        assert_eq!(sync.state().unread_count(&"c1".into()), 0);

        let actions = sync.handle(SyncEvent::LoadHistory { conversation_id: "c1".into() }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn published_snapshots_are_never_mutated() {
        let mut sync = joined("c1");
        let before = Arc::clone(sync.state());
        send(&mut sync, "c1", "hi");

        assert!(before.messages(&"c1".into()).is_empty());
        assert_eq!(sync.state().version, before.version + 1);
    }

    #[test]
    fn shutdown_rejects_later_intents() {
        let mut sync = joined("c1");
        let actions = sync.handle(SyncEvent::Shutdown).unwrap();
        assert_eq!(actions, vec![SyncAction::CloseAllSubscriptions]);

        assert_eq!(sync.handle(SyncEvent::LoadConversations), Err(SyncError::ShutDown));
        assert_eq!(sync.handle(SyncEvent::Shutdown), Ok(Vec::new()));
    }
}
