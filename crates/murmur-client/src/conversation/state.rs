//! Conversation sync snapshot.

use std::collections::HashMap;

use murmur_proto::{ClientId, Conversation, ConversationId, Message};

/// Load status of the conversation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing requested yet.
    #[default]
    Initial,
    /// Fetch in flight.
    Loading,
    /// List fetched.
    Loaded,
    /// Last fetch failed; see `last_error`.
    Error,
}

/// Paging position for a conversation's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCursor {
    /// Cursor for the next older page.
    pub cursor: Option<String>,
    /// Older history exists.
    pub has_more: bool,
}

impl Default for HistoryCursor {
    fn default() -> Self {
        Self { cursor: None, has_more: true }
    }
}

/// Immutable snapshot of everything [`crate::ConversationSync`] tracks.
///
/// Snapshots are shared as `Arc`s once published. The state machine copies
/// on write, so a snapshot held by a consumer never changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationSyncState {
    /// Incremented on every publish.
    pub version: u64,
    /// Conversation list load status.
    pub status: SyncStatus,
    /// Conversation list, replaced wholesale on reload.
    pub conversations: Vec<Conversation>,
    /// Messages per conversation, ascending by `created_at`.
    pub messages: HashMap<ConversationId, Vec<Message>>,
    /// Unread counters. Absent means zero.
    pub unread: HashMap<ConversationId, u32>,
    /// Conversation the user is looking at.
    pub active_conversation: Option<ConversationId>,
    /// Last surfaced failure.
    pub last_error: Option<String>,
    /// History paging per conversation.
    pub history: HashMap<ConversationId, HistoryCursor>,
}

impl ConversationSyncState {
    /// Messages for a conversation (empty if none are known).
    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.messages.get(conversation_id).map_or(&[], Vec::as_slice)
    }

    /// Unread count for a conversation.
    pub fn unread_count(&self, conversation_id: &ConversationId) -> u32 {
        self.unread.get(conversation_id).copied().unwrap_or(0)
    }

    /// Sum of all unread counters.
    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Message carrying `client_id`, if any.
    pub fn find_by_client_id(
        &self,
        conversation_id: &ConversationId,
        client_id: &ClientId,
    ) -> Option<&Message> {
        self.messages(conversation_id).iter().find(|m| m.client_id.as_ref() == Some(client_id))
    }

    /// History paging position (defaults to "more available").
    pub fn history_cursor(&self, conversation_id: &ConversationId) -> HistoryCursor {
        self.history.get(conversation_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_counters_read_as_zero() {
        let mut state = ConversationSyncState::default();
        assert_eq!(state.unread_count(&"c1".into()), 0);

        state.unread.insert("c1".into(), 2);
        state.unread.insert("c2".into(), 3);
        assert_eq!(state.unread_count(&"c1".into()), 2);
        assert_eq!(state.total_unread(), 5);
    }

    #[test]
    fn unknown_conversation_has_no_messages() {
        let state = ConversationSyncState::default();
        assert!(state.messages(&"nope".into()).is_empty());
        assert!(state.history_cursor(&"nope".into()).has_more);
    }
}
