//! Client error types.

use murmur_core::TransportError;
use thiserror::Error;

/// Errors surfaced by [`crate::ConversationSync`] and its runtime.
///
/// Connectivity failures on send are never reported here; they surface as the
/// failed flag on the message instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Intent named an empty conversation id
    #[error("conversation id must not be empty")]
    EmptyConversationId,

    /// Send intent had no content
    #[error("message content must not be empty")]
    EmptyContent,

    /// Component has shut down and accepts no further intents
    #[error("conversation sync has shut down")]
    ShutDown,

    /// Transport call failed (mark-read and reactions only)
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced by [`crate::TypingCoordinator`] and its runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypingError {
    /// Intent named an empty conversation id
    #[error("conversation id must not be empty")]
    EmptyConversationId,

    /// Component has shut down and accepts no further intents
    #[error("typing coordinator has shut down")]
    ShutDown,
}
