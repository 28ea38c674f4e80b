//! Session error types.

use murmur_client::{SyncError, TypingError};
use thiserror::Error;

/// Errors from [`crate::Session`] helpers that drive both runtimes.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Conversation sync rejected the intent
    #[error("sync: {0}")]
    Sync(#[from] SyncError),

    /// Typing coordinator rejected the intent
    #[error("typing: {0}")]
    Typing(#[from] TypingError),

    /// A runtime task panicked or was cancelled
    #[error("runtime task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
