//! Typing coordinator runtime.
//!
//! Mirrors the sync runtime: one task owns the [`TypingCoordinator`], intents
//! arrive through a bounded mailbox, and watched conversations get their own
//! event feed filtered down to typing envelopes. A ticker task only enqueues
//! ticks; the runtime stamps each event with the environment's monotonic
//! clock before handing it to the state machine.

use std::sync::Arc;

use futures::{StreamExt, future};
use murmur_client::{TypingAction, TypingCoordinator, TypingError, TypingEvent, TypingState};
use murmur_core::{Environment, SyncConfig, Transport, TypingConfig};
use murmur_proto::{ConversationId, RawEvent, UserId};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{AbortHandle, JoinHandle},
};

use crate::subscription::{FeedItem, SubscriptionTable, spawn_forwarder};

struct Command {
    event: TypingEvent,
    reply: oneshot::Sender<Result<(), TypingError>>,
}

/// Work produced inside the runtime: feed items and timer ticks.
#[derive(Debug)]
enum Internal {
    Feed(FeedItem<RawEvent>),
    Tick,
}

/// Spawn the typing runtime on the current tokio runtime.
///
/// The local user from `config` is used to ignore the backend echoing our own
/// typing signals back.
pub fn spawn_typing<T, E>(transport: Arc<T>, env: E, config: &SyncConfig) -> (TypingHandle, JoinHandle<()>)
where
    T: Transport,
    E: Environment,
{
    let local_user = (!config.user_id.is_empty()).then(|| config.user_id.clone());
    let machine = TypingCoordinator::new(config.typing.clone(), local_user);
    let (snapshots, updates) = watch::channel(Arc::clone(machine.state()));
    let (commands_tx, commands) = mpsc::channel(config.mailbox_capacity);
    let (internal_tx, internal) = mpsc::channel(config.mailbox_capacity);

    let ticker = spawn_ticker(env.clone(), &config.typing, internal_tx.clone());
    let runtime = TypingRuntime {
        machine,
        env,
        transport,
        commands,
        internal,
        internal_tx,
        snapshots,
        subscriptions: SubscriptionTable::default(),
        ticker,
    };
    let task = tokio::spawn(runtime.run());

    (TypingHandle { commands: commands_tx, updates }, task)
}

fn spawn_ticker<E: Environment>(
    env: E,
    config: &TypingConfig,
    mailbox: mpsc::Sender<Internal>,
) -> AbortHandle {
    let interval = config.tick_interval;
    tokio::spawn(async move {
        loop {
            env.sleep(interval).await;
            if mailbox.send(Internal::Tick).await.is_err() {
                break;
            }
        }
    })
    .abort_handle()
}

struct TypingRuntime<T, E: Environment> {
    machine: TypingCoordinator<E::Instant>,
    env: E,
    transport: Arc<T>,
    commands: mpsc::Receiver<Command>,
    internal: mpsc::Receiver<Internal>,
    /// Cloned into every feed forwarder.
    internal_tx: mpsc::Sender<Internal>,
    snapshots: watch::Sender<Arc<TypingState>>,
    subscriptions: SubscriptionTable,
    ticker: AbortHandle,
}

impl<T: Transport, E: Environment> TypingRuntime<T, E> {
    async fn run(mut self) {
        tracing::debug!("typing coordinator started");

        loop {
            tokio::select! {
                // Intents take priority; polling order is deterministic.
                biased;

                command = self.commands.recv() => match command {
                    Some(Command { event, reply }) => {
                        let result = self.dispatch(event).await;
                        let _ = reply.send(result);
                    },
                    None => {
                        tracing::debug!("all handles dropped");
                        if let Err(e) = self.dispatch(TypingEvent::Shutdown).await {
                            tracing::warn!(error = %e, "shutdown failed");
                        }
                    },
                },

                Some(internal) = self.internal.recv() => match internal {
                    Internal::Feed(item) => self.on_feed_item(item).await,
                    Internal::Tick => {
                        if let Err(e) = self.dispatch(TypingEvent::Tick).await {
                            tracing::warn!(error = %e, "tick rejected");
                        }
                    },
                },
            }

            if self.machine.is_shut_down() {
                break;
            }
        }

        self.ticker.abort();
        self.subscriptions.close_all();
        tracing::debug!("typing coordinator stopped");
    }

    async fn on_feed_item(&mut self, item: FeedItem<RawEvent>) {
        let FeedItem { conversation_id, subscription, payload } = item;

        if !self.subscriptions.is_current(&conversation_id, subscription) {
            tracing::warn!(%conversation_id, "dropping typing event from closed feed");
            return;
        }

        if let Err(e) = self.dispatch(TypingEvent::EventReceived { conversation_id, event: payload }).await {
            tracing::warn!(error = %e, "typing event rejected");
        }
    }

    async fn dispatch(&mut self, event: TypingEvent) -> Result<(), TypingError> {
        let actions = self.machine.handle(event, self.env.now())?;
        self.process_actions(actions).await;
        Ok(())
    }

    /// Execute actions in order.
    ///
    /// Typing calls are fire-and-forget: failures are logged and never reach
    /// the caller. They are still awaited one by one so a stop always reaches
    /// the transport before the start that follows it.
    async fn process_actions(&mut self, actions: Vec<TypingAction>) {
        for action in actions {
            match action {
                TypingAction::Publish(state) => {
                    self.snapshots.send_replace(state);
                },
                TypingAction::StartTyping { conversation_id } => {
                    if let Err(e) = self.transport.start_typing(&conversation_id).await {
                        tracing::warn!(%conversation_id, error = %e, "start typing failed");
                    }
                },
                TypingAction::StopTyping { conversation_id } => {
                    if let Err(e) = self.transport.stop_typing(&conversation_id).await {
                        tracing::warn!(%conversation_id, error = %e, "stop typing failed");
                    }
                },
                TypingAction::OpenFeed { conversation_id } => self.open_feed(conversation_id),
                TypingAction::CloseFeed { conversation_id } => {
                    self.subscriptions.close(&conversation_id);
                },
                TypingAction::CloseAllFeeds => {
                    self.subscriptions.close_all();
                },
            }
        }
    }

    fn open_feed(&mut self, conversation_id: ConversationId) {
        let id = self.subscriptions.next_id();
        let feed = self
            .transport
            .event_stream(&conversation_id)
            .filter(|event| future::ready(event.is_typing()));

        let tagged = conversation_id.clone();
        let task = spawn_forwarder(feed, self.internal_tx.clone(), move |event| {
            Internal::Feed(FeedItem { conversation_id: tagged.clone(), subscription: id, payload: event })
        });

        tracing::debug!(%conversation_id, "typing feed opened");
        self.subscriptions.insert(conversation_id, id, vec![task]);
    }
}

/// Handle to a running typing coordinator.
///
/// Cheap to clone. Intent methods resolve once the intent has been processed,
/// including any typing calls it triggered.
#[derive(Clone)]
pub struct TypingHandle {
    commands: mpsc::Sender<Command>,
    updates: watch::Receiver<Arc<TypingState>>,
}

impl std::fmt::Debug for TypingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingHandle").field("closed", &self.commands.is_closed()).finish()
    }
}

impl TypingHandle {
    /// Latest published snapshot.
    pub fn state(&self) -> Arc<TypingState> {
        Arc::clone(&self.updates.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn updates(&self) -> watch::Receiver<Arc<TypingState>> {
        self.updates.clone()
    }

    /// Local keystroke in a conversation.
    ///
    /// The start signal is sent once keystrokes pause for the debounce
    /// window.
    pub async fn typing_started(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), TypingError> {
        self.request(TypingEvent::TypingStarted { conversation_id: conversation_id.into() }).await
    }

    /// Local user stopped typing (sent the message or cleared the input).
    pub async fn typing_stopped(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), TypingError> {
        self.request(TypingEvent::TypingStopped { conversation_id: conversation_id.into() }).await
    }

    /// Local user closed a conversation.
    ///
    /// Unlike [`Self::typing_stopped`], a session typing in another
    /// conversation is left alone.
    pub async fn conversation_closed(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), TypingError> {
        self.request(TypingEvent::ConversationClosed { conversation_id: conversation_id.into() }).await
    }

    /// Remote user started typing, reported outside the event feed.
    pub async fn user_started(
        &self,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
    ) -> Result<(), TypingError> {
        self.request(TypingEvent::TypingUserStarted {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        })
        .await
    }

    /// Remote user stopped typing, reported outside the event feed.
    pub async fn user_stopped(
        &self,
        conversation_id: impl Into<ConversationId>,
        user_id: impl Into<UserId>,
    ) -> Result<(), TypingError> {
        self.request(TypingEvent::TypingUserStopped {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        })
        .await
    }

    /// Watch a conversation's remote typing activity.
    pub async fn subscribe(&self, conversation_id: impl Into<ConversationId>) -> Result<(), TypingError> {
        self.request(TypingEvent::Subscribe { conversation_id: conversation_id.into() }).await
    }

    /// Stop watching a conversation and forget its typing users.
    pub async fn unsubscribe(&self, conversation_id: impl Into<ConversationId>) -> Result<(), TypingError> {
        self.request(TypingEvent::Unsubscribe { conversation_id: conversation_id.into() }).await
    }

    /// Stop any local session, close every feed and stop the runtime.
    pub async fn shutdown(&self) -> Result<(), TypingError> {
        match self.request(TypingEvent::Shutdown).await {
            Err(TypingError::ShutDown) => Ok(()),
            other => other,
        }
    }

    async fn request(&self, event: TypingEvent) -> Result<(), TypingError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command { event, reply }).await.map_err(|_| TypingError::ShutDown)?;
        response.await.map_err(|_| TypingError::ShutDown)?
    }
}
