//! Transport error types.
//!
//! The networking layer reports failures through [`TransportError`]. The sync
//! core never treats these as fatal: it maps them onto visible state (failed
//! message flag, error status) or hands them back to the caller.

use thiserror::Error;

/// Errors reported by a [`crate::Transport`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection to the backend is unavailable
    #[error("connection error: {0}")]
    Connection(String),

    /// Backend refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Transport has been shut down
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Rejections are never transient: the backend made a decision.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}
