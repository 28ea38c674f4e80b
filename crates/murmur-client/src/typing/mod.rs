//! Typing indicator coordination.
//!
//! Two independent state machines share one coordinator:
//!
//! - The local outgoing signal: `Idle -> PendingDebounce -> Active -> Idle`.
//!   At most one local session exists; switching conversations stops the
//!   previous one before starting the next.
//! - Remote indicators, one expiry deadline per (conversation, user).
//!
//! Timers are deadlines, not tasks. The runtime delivers [`TypingEvent::Tick`]
//! with the current time and expired deadlines fire from inside `handle`.

mod event;
mod state;

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    ops::Add,
    sync::Arc,
    time::Duration,
};

pub use event::{TypingAction, TypingEvent};
use murmur_core::TypingConfig;
use murmur_proto::{ConversationId, FeedEvent, UserId};
pub use state::TypingState;

use crate::TypingError;

#[derive(Debug, Clone)]
struct PendingStart<I> {
    conversation_id: ConversationId,
    fire_at: I,
}

/// Typing coordinator state machine.
///
/// Generic over the instant type so production and simulation clocks drive
/// the same code.
#[derive(Debug)]
pub struct TypingCoordinator<I> {
    config: TypingConfig,
    /// Typing echoes for this user are ignored.
    local_user: Option<UserId>,
    /// Conversation that last received a start call.
    active: Option<ConversationId>,
    /// Debounce in flight.
    pending: Option<PendingStart<I>>,
    auto_stop_at: Option<I>,
    remote_deadlines: HashMap<(ConversationId, UserId), I>,
    subscriptions: HashSet<ConversationId>,
    state: Arc<TypingState>,
    shut_down: bool,
}

impl<I> TypingCoordinator<I>
where
    I: Copy + Ord + Debug + Add<Duration, Output = I>,
{
    /// Create a coordinator. `local_user` filters own typing echoes.
    pub fn new(config: TypingConfig, local_user: Option<UserId>) -> Self {
        Self {
            config,
            local_user,
            active: None,
            pending: None,
            auto_stop_at: None,
            remote_deadlines: HashMap::new(),
            subscriptions: HashSet::new(),
            state: Arc::new(TypingState::default()),
            shut_down: false,
        }
    }

    /// Process an event at time `now` and return actions.
    ///
    /// # Errors
    ///
    /// - [`TypingError::EmptyConversationId`] for intents naming no
    ///   conversation
    /// - [`TypingError::ShutDown`] for anything but `Shutdown` after shutdown
    pub fn handle(&mut self, event: TypingEvent, now: I) -> Result<Vec<TypingAction>, TypingError> {
        if self.shut_down {
            return match event {
                TypingEvent::Shutdown => Ok(Vec::new()),
                _ => Err(TypingError::ShutDown),
            };
        }

        match event {
            TypingEvent::TypingStarted { conversation_id } => {
                require_id(&conversation_id)?;
                self.pending = Some(PendingStart { conversation_id, fire_at: now + self.config.debounce });
                self.auto_stop_at = None;
                Ok(Vec::new())
            },
            TypingEvent::TypingStopped { conversation_id } => {
                require_id(&conversation_id)?;
                Ok(self.stop_local())
            },
            TypingEvent::ConversationClosed { conversation_id } => {
                require_id(&conversation_id)?;
                let targeted = self.active.as_ref() == Some(&conversation_id)
                    || self.pending_conversation() == Some(&conversation_id);
                if !targeted {
                    return Ok(Vec::new());
                }
                Ok(self.stop_local())
            },
            TypingEvent::TypingUserStarted { conversation_id, user_id } => {
                require_id(&conversation_id)?;
                let changed = self.user_started(conversation_id, user_id, now);
                Ok(self.publish_if(changed))
            },
            TypingEvent::TypingUserStopped { conversation_id, user_id } => {
                require_id(&conversation_id)?;
                let changed = self.user_stopped(&conversation_id, &user_id);
                Ok(self.publish_if(changed))
            },
            TypingEvent::EventReceived { conversation_id, event } => {
                let changed = match FeedEvent::decode(&event) {
                    Ok(FeedEvent::TypingStart { user_id }) => {
                        self.user_started(conversation_id, user_id, now)
                    },
                    Ok(FeedEvent::TypingStop { user_id }) => {
                        self.user_stopped(&conversation_id, &user_id)
                    },
                    Ok(_) => false,
                    Err(e) => {
                        tracing::warn!(%conversation_id, error = %e, "dropping malformed typing event");
                        false
                    },
                };
                Ok(self.publish_if(changed))
            },
            TypingEvent::Subscribe { conversation_id } => {
                require_id(&conversation_id)?;
                if !self.subscriptions.insert(conversation_id.clone()) {
                    return Ok(Vec::new());
                }
                tracing::debug!(%conversation_id, "watching typing");
                Ok(vec![TypingAction::OpenFeed { conversation_id }])
            },
            TypingEvent::Unsubscribe { conversation_id } => {
                require_id(&conversation_id)?;
                Ok(self.unsubscribe(conversation_id))
            },
            TypingEvent::Tick => Ok(self.tick(now)),
            TypingEvent::Shutdown => Ok(self.shutdown()),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> &Arc<TypingState> {
        &self.state
    }

    /// Conversation holding the local session, if active.
    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Conversation waiting on the debounce, if any.
    pub fn pending_conversation(&self) -> Option<&ConversationId> {
        self.pending.as_ref().map(|p| &p.conversation_id)
    }

    /// True if the conversation's typing feed is open.
    pub fn is_subscribed(&self, conversation_id: &ConversationId) -> bool {
        self.subscriptions.contains(conversation_id)
    }

    /// True once `Shutdown` has been processed.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<I> {
        let local = [self.pending.as_ref().map(|p| p.fire_at), self.auto_stop_at];
        local.into_iter().flatten().chain(self.remote_deadlines.values().copied()).min()
    }

    fn stop_local(&mut self) -> Vec<TypingAction> {
        self.pending = None;
        self.auto_stop_at = None;
        match self.active.take() {
            Some(conversation_id) => {
                tracing::debug!(%conversation_id, "local typing stopped");
                vec![TypingAction::StopTyping { conversation_id }]
            },
            None => Vec::new(),
        }
    }

    fn tick(&mut self, now: I) -> Vec<TypingAction> {
        let mut actions = Vec::new();

        if let Some(pending) = self.pending.take_if(|p| p.fire_at <= now) {
            let target = pending.conversation_id;
            if let Some(previous) = self.active.take_if(|active| *active != target) {
                tracing::debug!(from = %previous, to = %target, "switching typing conversation");
                actions.push(TypingAction::StopTyping { conversation_id: previous });
            }
            actions.push(TypingAction::StartTyping { conversation_id: target.clone() });
            self.active = Some(target);
            self.auto_stop_at = Some(now + self.config.auto_stop);
        }

        if self.auto_stop_at.is_some_and(|at| at <= now) {
            self.auto_stop_at = None;
            if let Some(conversation_id) = self.active.take() {
                tracing::debug!(%conversation_id, "local typing auto-stopped");
                actions.push(TypingAction::StopTyping { conversation_id });
            }
        }

        let expired: Vec<_> = self
            .remote_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut changed = false;
        for (conversation_id, user_id) in expired {
            tracing::debug!(%conversation_id, %user_id, "remote typing expired");
            changed |= self.user_stopped(&conversation_id, &user_id);
        }

        actions.extend(self.publish_if(changed));
        actions
    }

    fn user_started(&mut self, conversation_id: ConversationId, user_id: UserId, now: I) -> bool {
        if self.local_user.as_ref() == Some(&user_id) {
            return false;
        }

        self.remote_deadlines
            .insert((conversation_id.clone(), user_id.clone()), now + self.config.remote_expiry);

        if self.state.is_typing(&conversation_id, &user_id) {
            return false;
        }

        Arc::make_mut(&mut self.state).typing.entry(conversation_id).or_default().insert(user_id);
        true
    }

    fn user_stopped(&mut self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.remote_deadlines.remove(&(conversation_id.clone(), user_id.clone()));

        if !self.state.is_typing(conversation_id, user_id) {
            return false;
        }

        let state = Arc::make_mut(&mut self.state);
        if let Some(users) = state.typing.get_mut(conversation_id) {
            users.remove(user_id);
            if users.is_empty() {
                state.typing.remove(conversation_id);
            }
        }
        true
    }

    fn unsubscribe(&mut self, conversation_id: ConversationId) -> Vec<TypingAction> {
        let mut actions = Vec::new();
        if self.subscriptions.remove(&conversation_id) {
            tracing::debug!(%conversation_id, "no longer watching typing");
            actions.push(TypingAction::CloseFeed { conversation_id: conversation_id.clone() });
        }

        self.remote_deadlines.retain(|(conversation, _), _| *conversation != conversation_id);
        let changed = self.state.typing.contains_key(&conversation_id);
        if changed {
            Arc::make_mut(&mut self.state).typing.remove(&conversation_id);
        }

        actions.extend(self.publish_if(changed));
        actions
    }

    fn shutdown(&mut self) -> Vec<TypingAction> {
        tracing::info!(subscriptions = self.subscriptions.len(), "typing coordinator shutting down");
        self.shut_down = true;
        self.subscriptions.clear();
        self.remote_deadlines.clear();

        let mut actions = vec![TypingAction::CloseAllFeeds];
        actions.extend(self.stop_local());

        let changed = !self.state.typing.is_empty();
        if changed {
            Arc::make_mut(&mut self.state).typing.clear();
        }
        actions.extend(self.publish_if(changed));
        actions
    }

    fn publish_if(&mut self, changed: bool) -> Vec<TypingAction> {
        if !changed {
            return Vec::new();
        }

        Arc::make_mut(&mut self.state).version += 1;
        vec![TypingAction::Publish(Arc::clone(&self.state))]
    }
}

fn require_id(conversation_id: &ConversationId) -> Result<(), TypingError> {
    if conversation_id.is_empty() {
        return Err(TypingError::EmptyConversationId);
    }
    Ok(())
}
