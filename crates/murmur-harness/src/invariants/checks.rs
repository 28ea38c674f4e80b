//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use super::{Invariant, InvariantKind, InvariantResult, SystemSnapshot, Violation};

/// Message collections are ascending by `created_at`.
///
/// Delivery order is arbitrary; the ordering must come from insertion, not
/// from the feed.
pub struct MessagesSorted;

impl Invariant for MessagesSorted {
    fn kind(&self) -> InvariantKind {
        InvariantKind::MessagesSorted
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (conversation_id, messages) in &state.sync.messages {
            for (index, window) in messages.windows(2).enumerate() {
                if window[1].created_at < window[0].created_at {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "conversation {conversation_id}: message {} at {} precedes {}",
                            index,
                            window[0].created_at,
                            window[1].created_at
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most one message per conversation carries a given client id.
///
/// A duplicate means an echo was inserted instead of reconciled.
pub struct SingleClientIdPerConversation;

impl Invariant for SingleClientIdPerConversation {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SingleClientIdPerConversation
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (conversation_id, messages) in &state.sync.messages {
            let mut seen = HashSet::new();
            for client_id in messages.iter().filter_map(|m| m.client_id.as_ref()) {
                if !seen.insert(client_id) {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!(
                            "conversation {conversation_id}: client id {client_id} appears twice"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// At most one message per conversation carries a given server id.
///
/// A duplicate means a redelivery, history page or late echo was inserted
/// next to a copy already held.
pub struct SingleServerIdPerConversation;

impl Invariant for SingleServerIdPerConversation {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SingleServerIdPerConversation
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (conversation_id, messages) in &state.sync.messages {
            let mut seen = HashSet::new();
            for id in messages.iter().filter_map(|m| m.id.as_ref()) {
                if !seen.insert(id) {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!("conversation {conversation_id}: message {id} appears twice"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A message is never both pending and failed.
pub struct NoPendingFailures;

impl Invariant for NoPendingFailures {
    fn kind(&self) -> InvariantKind {
        InvariantKind::NoPendingFailures
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let stuck = state.sync.messages.values().flatten().find(|m| m.is_pending && m.has_failed);
        match stuck {
            Some(message) => Err(Violation {
                invariant: self.kind(),
                message: format!(
                    "conversation {}: message {:?} is pending and failed",
                    message.conversation_id, message.client_id
                ),
            }),
            None => Ok(()),
        }
    }
}

/// Stored unread counters are positive.
///
/// Absent means zero; a stored zero means a reset left a stale key.
pub struct UnreadCountsPositive;

impl Invariant for UnreadCountsPositive {
    fn kind(&self) -> InvariantKind {
        InvariantKind::UnreadCountsPositive
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (conversation_id, count) in &state.sync.unread {
            if *count == 0 {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!("conversation {conversation_id}: unread count stored as zero"),
                });
            }
        }
        Ok(())
    }
}

/// Typing sets are never stored empty.
///
/// An empty set must drop its conversation key entirely.
pub struct TypingSetsNonEmpty;

impl Invariant for TypingSetsNonEmpty {
    fn kind(&self) -> InvariantKind {
        InvariantKind::TypingSetsNonEmpty
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (conversation_id, users) in &state.typing.typing {
            if users.is_empty() {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!("conversation {conversation_id}: empty typing set kept"),
                });
            }
        }
        Ok(())
    }
}

/// Snapshot versions never decrease.
pub struct VersionMonotonicity;

impl Invariant for VersionMonotonicity {
    fn kind(&self) -> InvariantKind {
        InvariantKind::VersionMonotonicity
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (component, history) in [("sync", &state.sync_versions), ("typing", &state.typing_versions)] {
            for window in history.windows(2) {
                if window[1] < window[0] {
                    return Err(Violation {
                        invariant: self.kind(),
                        message: format!("{component}: version decreased {} → {}", window[0], window[1]),
                    });
                }
            }
        }
        Ok(())
    }
}
