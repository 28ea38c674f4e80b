//! Typing coordinator inputs and outputs.

use std::sync::Arc;

use murmur_proto::{ConversationId, RawEvent, UserId};

use super::TypingState;

/// Events processed by [`crate::TypingCoordinator`].
#[derive(Debug, Clone)]
pub enum TypingEvent {
    /// Local user typed in a conversation.
    TypingStarted {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// Local user stopped typing (sent, cleared input, left).
    TypingStopped {
        /// Conversation typing stopped in.
        conversation_id: ConversationId,
    },

    /// Local user closed a conversation. Stops the local session only if it
    /// targets that conversation.
    ConversationClosed {
        /// Conversation being closed.
        conversation_id: ConversationId,
    },

    /// Remote user started typing.
    TypingUserStarted {
        /// Conversation the user types in.
        conversation_id: ConversationId,
        /// Typing user.
        user_id: UserId,
    },

    /// Remote user stopped typing.
    TypingUserStopped {
        /// Conversation the user typed in.
        conversation_id: ConversationId,
        /// User who stopped.
        user_id: UserId,
    },

    /// Raw envelope pushed by the typing event feed.
    EventReceived {
        /// Conversation the feed belongs to.
        conversation_id: ConversationId,
        /// Undecoded event.
        event: RawEvent,
    },

    /// Watch a conversation's remote typing activity.
    Subscribe {
        /// Conversation to watch.
        conversation_id: ConversationId,
    },

    /// Stop watching a conversation.
    Unsubscribe {
        /// Conversation to stop watching.
        conversation_id: ConversationId,
    },

    /// Timer tick. Expired deadlines fire.
    Tick,

    /// Tear down feeds and timers, stop any local session.
    Shutdown,
}

/// Actions produced by [`crate::TypingCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingAction {
    /// Emit a new snapshot.
    Publish(Arc<TypingState>),

    /// Call `start_typing`.
    StartTyping {
        /// Conversation typed in.
        conversation_id: ConversationId,
    },

    /// Call `stop_typing`.
    StopTyping {
        /// Conversation typing stopped in.
        conversation_id: ConversationId,
    },

    /// Open a typing-filtered event feed.
    OpenFeed {
        /// Watched conversation.
        conversation_id: ConversationId,
    },

    /// Close the event feed for a conversation.
    CloseFeed {
        /// Conversation no longer watched.
        conversation_id: ConversationId,
    },

    /// Close every event feed.
    CloseAllFeeds,
}
