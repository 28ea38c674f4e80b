//! Conversation sync runtime.
//!
//! A single task owns the [`ConversationSync`] state machine. User intents
//! arrive through a bounded mailbox together with a reply channel; feed items
//! arrive through a second mailbox filled by the subscription forwarders.
//! Because one task handles both, every state change is serialized.
//!
//! Transport calls are awaited inside the task and their results are fed
//! back into the state machine as follow-up events, so an intent's reply is
//! only sent once everything it triggered has settled.

use std::{collections::VecDeque, sync::Arc};

use murmur_client::{ConversationSync, ConversationSyncState, SyncAction, SyncError, SyncEvent};
use murmur_core::{Environment, SyncConfig, Transport};
use murmur_proto::{ClientId, ConversationId, Message, MessageId, MessageType, RawEvent};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::subscription::{FeedItem, SubscriptionTable, spawn_forwarder};

type Reply = oneshot::Sender<Result<(), SyncError>>;

struct Command {
    event: SyncEvent,
    reply: Reply,
}

#[derive(Debug)]
enum FeedPayload {
    Message(Message),
    Event(RawEvent),
}

/// Spawn the conversation sync runtime on the current tokio runtime.
///
/// Returns the handle used to submit intents and the task running the loop.
/// The loop ends after [`SyncHandle::shutdown`] or once every handle has been
/// dropped.
pub fn spawn_sync<T, E>(transport: Arc<T>, env: E, config: &SyncConfig) -> (SyncHandle, JoinHandle<()>)
where
    T: Transport,
    E: Environment,
{
    let machine = ConversationSync::new(env, config.user_id.clone());
    let (snapshots, updates) = watch::channel(Arc::clone(machine.state()));
    let (commands_tx, commands) = mpsc::channel(config.mailbox_capacity);
    let (feed_tx, feeds) = mpsc::channel(config.mailbox_capacity);

    let runtime = SyncRuntime {
        machine,
        transport,
        commands,
        feeds,
        feed_tx,
        snapshots,
        subscriptions: SubscriptionTable::default(),
    };
    let task = tokio::spawn(runtime.run());

    (SyncHandle { commands: commands_tx, updates }, task)
}

struct SyncRuntime<T, E: Environment> {
    machine: ConversationSync<E>,
    transport: Arc<T>,
    commands: mpsc::Receiver<Command>,
    feeds: mpsc::Receiver<FeedItem<FeedPayload>>,
    /// Cloned into every forwarder.
    feed_tx: mpsc::Sender<FeedItem<FeedPayload>>,
    snapshots: watch::Sender<Arc<ConversationSyncState>>,
    subscriptions: SubscriptionTable,
}

impl<T: Transport, E: Environment> SyncRuntime<T, E> {
    async fn run(mut self) {
        tracing::debug!("conversation sync started");

        loop {
            tokio::select! {
                // Intents take priority; polling order is deterministic.
                biased;

                command = self.commands.recv() => match command {
                    Some(Command { event, reply }) => {
                        let result = self.dispatch(event).await;
                        // Caller may have given up waiting.
                        let _ = reply.send(result);
                    },
                    None => {
                        tracing::debug!("all handles dropped");
                        if let Err(e) = self.dispatch(SyncEvent::Shutdown).await {
                            tracing::warn!(error = %e, "shutdown failed");
                        }
                    },
                },

                Some(item) = self.feeds.recv() => self.on_feed_item(item).await,
            }

            if self.machine.is_shut_down() {
                break;
            }
        }

        self.subscriptions.close_all();
        tracing::debug!("conversation sync stopped");
    }

    async fn on_feed_item(&mut self, item: FeedItem<FeedPayload>) {
        let FeedItem { conversation_id, subscription, payload } = item;

        if !self.subscriptions.is_current(&conversation_id, subscription) {
            tracing::warn!(%conversation_id, "dropping item from closed subscription");
            return;
        }

        let event = match payload {
            FeedPayload::Message(message) => SyncEvent::MessageReceived { conversation_id, message },
            FeedPayload::Event(event) => SyncEvent::EventReceived { conversation_id, event },
        };

        if let Err(e) = self.dispatch(event).await {
            tracing::warn!(error = %e, "feed item rejected");
        }
    }

    async fn dispatch(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        let actions = self.machine.handle(event)?;
        self.process_actions(actions).await
    }

    /// Execute actions, feeding transport results back as events.
    ///
    /// Uses iterative processing to avoid async recursion between actions and
    /// follow-up events. Errors meant for the caller are held until every
    /// action has run; the first one wins.
    async fn process_actions(&mut self, actions: Vec<SyncAction>) -> Result<(), SyncError> {
        let mut pending: VecDeque<SyncAction> = actions.into();
        let mut outcome = Ok(());

        while let Some(action) = pending.pop_front() {
            let (follow_up, error) = self.execute(action).await;

            if let Some(event) = follow_up {
                pending.extend(self.machine.handle(event)?);
            }
            if let Some(error) = error
                && outcome.is_ok()
            {
                outcome = Err(error);
            }
        }

        outcome
    }

    async fn execute(&mut self, action: SyncAction) -> (Option<SyncEvent>, Option<SyncError>) {
        match action {
            SyncAction::Publish(state) => {
                self.snapshots.send_replace(state);
                (None, None)
            },
            SyncAction::FetchConversations => {
                let event = match self.transport.fetch_conversations().await {
                    Ok(conversations) => SyncEvent::ConversationsLoaded { conversations },
                    Err(e) => SyncEvent::ConversationsFailed { reason: e.to_string() },
                };
                (Some(event), None)
            },
            SyncAction::Join { conversation_id } => {
                let accepted = match self.transport.join_conversation(&conversation_id).await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(%conversation_id, error = %e, "join failed");
                        false
                    },
                };
                (Some(SyncEvent::JoinCompleted { conversation_id, accepted }), None)
            },
            SyncAction::OpenSubscriptions { conversation_id } => {
                self.open_subscriptions(conversation_id);
                (None, None)
            },
            SyncAction::CloseSubscriptions { conversation_id } => {
                if !self.subscriptions.close(&conversation_id) {
                    tracing::debug!(%conversation_id, "no subscription to close");
                }
                (None, None)
            },
            SyncAction::Leave { conversation_id } => {
                if let Err(e) = self.transport.leave_conversation(&conversation_id).await {
                    tracing::warn!(%conversation_id, error = %e, "leave failed");
                }
                (None, None)
            },
            SyncAction::Send(outgoing) => {
                let conversation_id = outgoing.conversation_id.clone();
                let client_id = outgoing.client_id.clone();
                let is_ok = match self.transport.send_message(outgoing).await {
                    Ok(receipt) => receipt.is_ok,
                    Err(e) => {
                        tracing::warn!(%conversation_id, %client_id, error = %e, "send failed");
                        false
                    },
                };
                (Some(SyncEvent::SendCompleted { conversation_id, client_id, is_ok }), None)
            },
            SyncAction::MarkAsRead { conversation_id, message_id } => {
                let error = self.transport.mark_as_read(&conversation_id, &message_id).await.err();
                if let Some(e) = &error {
                    tracing::warn!(%conversation_id, error = %e, "mark as read failed");
                }
                (Some(SyncEvent::MarkReadCompleted { conversation_id }), error.map(SyncError::from))
            },
            SyncAction::AddReaction { conversation_id, message_id, emoji } => {
                let result = self.transport.add_reaction(&conversation_id, &message_id, &emoji).await;
                (None, result.err().map(SyncError::from))
            },
            SyncAction::RemoveReaction { conversation_id, message_id, emoji } => {
                let result = self.transport.remove_reaction(&conversation_id, &message_id, &emoji).await;
                (None, result.err().map(SyncError::from))
            },
            SyncAction::FetchHistory { conversation_id, before } => {
                let event = match self.transport.fetch_messages(&conversation_id, before).await {
                    Ok(page) => SyncEvent::HistoryLoaded { conversation_id, page },
                    Err(e) => SyncEvent::HistoryFailed { conversation_id, reason: e.to_string() },
                };
                (Some(event), None)
            },
            SyncAction::CloseAllSubscriptions => {
                let closed = self.subscriptions.close_all();
                tracing::debug!(closed, "closed all subscriptions");
                (None, None)
            },
        }
    }

    fn open_subscriptions(&mut self, conversation_id: ConversationId) {
        let id = self.subscriptions.next_id();
        let messages = self.transport.message_stream(&conversation_id);
        let events = self.transport.event_stream(&conversation_id);

        let message_conversation = conversation_id.clone();
        let event_conversation = conversation_id.clone();
        let tasks = vec![
            spawn_forwarder(messages, self.feed_tx.clone(), move |message| FeedItem {
                conversation_id: message_conversation.clone(),
                subscription: id,
                payload: FeedPayload::Message(message),
            }),
            spawn_forwarder(events, self.feed_tx.clone(), move |event| FeedItem {
                conversation_id: event_conversation.clone(),
                subscription: id,
                payload: FeedPayload::Event(event),
            }),
        ];

        tracing::debug!(%conversation_id, "subscriptions opened");
        self.subscriptions.insert(conversation_id, id, tasks);
    }
}

/// Handle to a running conversation sync.
///
/// Cheap to clone. Every intent method resolves once the intent and all the
/// transport work it triggered have been processed.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    updates: watch::Receiver<Arc<ConversationSyncState>>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle").field("closed", &self.commands.is_closed()).finish()
    }
}

impl SyncHandle {
    /// Latest published snapshot.
    pub fn state(&self) -> Arc<ConversationSyncState> {
        Arc::clone(&self.updates.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn updates(&self) -> watch::Receiver<Arc<ConversationSyncState>> {
        self.updates.clone()
    }

    /// Fetch the conversation list.
    ///
    /// A transport failure is recorded in the state (`status = Error`), not
    /// returned.
    pub async fn load_conversations(&self) -> Result<(), SyncError> {
        self.request(SyncEvent::LoadConversations).await
    }

    /// Join a conversation and make it active.
    ///
    /// A refused join leaves the state untouched.
    pub async fn join(&self, conversation_id: impl Into<ConversationId>) -> Result<(), SyncError> {
        self.request(SyncEvent::JoinConversation { conversation_id: conversation_id.into() }).await
    }

    /// Leave a conversation. Its feeds are cancelled before the transport
    /// call is made.
    pub async fn leave(&self, conversation_id: impl Into<ConversationId>) -> Result<(), SyncError> {
        self.request(SyncEvent::LeaveConversation { conversation_id: conversation_id.into() }).await
    }

    /// Send a text message.
    pub async fn send_text(
        &self,
        conversation_id: impl Into<ConversationId>,
        content: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.send_message(conversation_id, content, MessageType::Text, None).await
    }

    /// Send a message.
    ///
    /// The optimistic copy is published before the transport is called. A
    /// refused or failed send flags the message as failed instead of
    /// returning an error.
    pub async fn send_message(
        &self,
        conversation_id: impl Into<ConversationId>,
        content: impl Into<String>,
        message_type: MessageType,
        reply_to: Option<MessageId>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::SendMessage {
            conversation_id: conversation_id.into(),
            content: content.into(),
            message_type,
            reply_to,
        })
        .await
    }

    /// Resend a failed message under its original client id.
    pub async fn retry_message(
        &self,
        conversation_id: impl Into<ConversationId>,
        client_id: impl Into<ClientId>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::RetryMessage {
            conversation_id: conversation_id.into(),
            client_id: client_id.into(),
        })
        .await
    }

    /// Mark a conversation read up to a message.
    ///
    /// The local counter is cleared whatever the transport answers; a
    /// transport failure is still returned.
    pub async fn mark_as_read(
        &self,
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::MarkAsRead {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        })
        .await
    }

    /// Add a reaction. Transport failures are returned.
    pub async fn add_reaction(
        &self,
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
        emoji: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::AddReaction {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            emoji: emoji.into(),
        })
        .await
    }

    /// Remove a reaction. Transport failures are returned.
    pub async fn remove_reaction(
        &self,
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<MessageId>,
        emoji: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::RemoveReaction {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            emoji: emoji.into(),
        })
        .await
    }

    /// Fetch the next page of older messages.
    pub async fn load_history(&self, conversation_id: impl Into<ConversationId>) -> Result<(), SyncError> {
        self.request(SyncEvent::LoadHistory { conversation_id: conversation_id.into() }).await
    }

    /// Change the active conversation without touching subscriptions.
    pub async fn set_active_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<(), SyncError> {
        self.request(SyncEvent::SetActiveConversation { conversation_id }).await
    }

    /// Clear the last recorded error.
    pub async fn clear_error(&self) -> Result<(), SyncError> {
        self.request(SyncEvent::ClearError).await
    }

    /// Cancel every subscription and stop the runtime.
    ///
    /// Later intents on any handle fail with [`SyncError::ShutDown`].
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        match self.request(SyncEvent::Shutdown).await {
            Err(SyncError::ShutDown) => Ok(()),
            other => other,
        }
    }

    async fn request(&self, event: SyncEvent) -> Result<(), SyncError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command { event, reply }).await.map_err(|_| SyncError::ShutDown)?;
        response.await.map_err(|_| SyncError::ShutDown)?
    }
}
