//! Remote typing snapshot.

use std::collections::{BTreeSet, HashMap};

use murmur_proto::{ConversationId, UserId};

/// Remote users currently typing, per conversation.
///
/// A conversation key is present only while its set is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypingState {
    /// Incremented on every publish.
    pub version: u64,
    /// Typing users per conversation.
    pub typing: HashMap<ConversationId, BTreeSet<UserId>>,
}

impl TypingState {
    /// True if `user_id` is flagged as typing in the conversation.
    pub fn is_typing(&self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.typing.get(conversation_id).is_some_and(|users| users.contains(user_id))
    }

    /// Users typing in the conversation, in id order.
    pub fn typing_users(&self, conversation_id: &ConversationId) -> Vec<&UserId> {
        self.typing.get(conversation_id).map(|users| users.iter().collect()).unwrap_or_default()
    }
}
