//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of both components at a point in
//! time. Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::sync::Arc;

use murmur_client::{ConversationSyncState, TypingState};

/// Snapshot of a client session.
///
/// Holds the latest published states plus the version history observed so
/// far (for monotonicity checks).
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Latest conversation sync state.
    pub sync: Arc<ConversationSyncState>,
    /// Latest typing state.
    pub typing: Arc<TypingState>,
    /// Every sync version observed, in observation order.
    pub sync_versions: Vec<u64>,
    /// Every typing version observed, in observation order.
    pub typing_versions: Vec<u64>,
}

impl SystemSnapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot from a single observation.
    pub fn new(sync: Arc<ConversationSyncState>, typing: Arc<TypingState>) -> Self {
        let mut snapshot = Self::empty();
        snapshot.observe(sync, typing);
        snapshot
    }

    /// Snapshot of the sync component alone.
    pub fn from_sync(sync: Arc<ConversationSyncState>) -> Self {
        Self::new(sync, Arc::default())
    }

    /// Snapshot of the typing component alone.
    pub fn from_typing(typing: Arc<TypingState>) -> Self {
        Self::new(Arc::default(), typing)
    }

    /// Record a new observation of both components.
    pub fn observe(&mut self, sync: Arc<ConversationSyncState>, typing: Arc<TypingState>) {
        self.sync_versions.push(sync.version);
        self.typing_versions.push(typing.version);
        self.sync = sync;
        self.typing = typing;
    }
}
