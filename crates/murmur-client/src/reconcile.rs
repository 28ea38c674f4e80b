//! Message ordering and reconciliation.
//!
//! A conversation's collection is always sorted ascending by `created_at`.
//! Incoming messages are matched in an explicit order:
//!
//! 1. `client_id` equality: the server echo of a local optimistic message
//! 2. server `id` equality: redelivery or a full-message update
//! 3. neither: a new message, inserted at its sorted position
//!
//! Matches are replaced in place, keeping their array position. Only if the
//! replacement's timestamp breaks ordering with a neighbour is the collection
//! re-sorted. A server copy that arrived ahead of the echo (history page,
//! redelivery without `client_id`) is folded into the reconciled entry, so a
//! server id appears at most once.

use murmur_proto::{ClientId, Message, MessageId};

/// How an incoming message was merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Replaced the local copy carrying the same `client_id`.
    Reconciled,
    /// Replaced an existing copy with the same server id.
    Replaced,
    /// Inserted as a new message.
    Inserted,
}

/// Merge a message delivered by the backend into a sorted collection.
///
/// The merged copy is confirmed: its pending and failed flags are cleared.
pub fn merge_incoming(messages: &mut Vec<Message>, mut incoming: Message) -> Merge {
    incoming.is_pending = false;
    incoming.has_failed = false;

    let by_client_id =
        incoming.client_id.as_ref().and_then(|client_id| position_by_client_id(messages, client_id));
    if let Some(mut index) = by_client_id {
        if let Some(id) = incoming.id.as_ref() {
            index = remove_other_copies(messages, index, id);
        }
        messages[index] = incoming;
        restore_order(messages, index);
        return Merge::Reconciled;
    }

    let by_server_id = incoming.id.as_ref().and_then(|id| position_by_server_id(messages, id));
    if let Some(index) = by_server_id {
        if incoming.client_id.is_none() {
            incoming.client_id = messages[index].client_id.take();
        }
        messages[index] = incoming;
        restore_order(messages, index);
        return Merge::Replaced;
    }

    insert_sorted(messages, incoming);
    Merge::Inserted
}

/// Insert after every message with `created_at <= message.created_at`.
///
/// Equal timestamps keep arrival order. Returns the insertion index.
pub fn insert_sorted(messages: &mut Vec<Message>, message: Message) -> usize {
    let index = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(index, message);
    index
}

/// Index of the message carrying `client_id`.
pub fn position_by_client_id(messages: &[Message], client_id: &ClientId) -> Option<usize> {
    messages.iter().position(|m| m.client_id.as_ref() == Some(client_id))
}

/// Index of the still-pending message carrying `client_id`.
///
/// Returns `None` once the echo has reconciled the message, which is what
/// makes a late send reply a no-op.
pub fn pending_position(messages: &[Message], client_id: &ClientId) -> Option<usize> {
    messages.iter().position(|m| m.is_pending && m.client_id.as_ref() == Some(client_id))
}

/// Index of the message with server id `id`.
pub fn position_by_server_id(messages: &[Message], id: &MessageId) -> Option<usize> {
    messages.iter().position(|m| m.id.as_ref() == Some(id))
}

/// True if the collection is non-decreasing in `created_at`.
pub fn is_sorted(messages: &[Message]) -> bool {
    messages.windows(2).all(|w| w[0].created_at <= w[1].created_at)
}

/// Drop every entry other than `keep` carrying server id `id`. Returns the
/// shifted index of `keep`.
fn remove_other_copies(messages: &mut Vec<Message>, mut keep: usize, id: &MessageId) -> usize {
    while let Some(dup) =
        messages.iter().enumerate().position(|(i, m)| i != keep && m.id.as_ref() == Some(id))
    {
        messages.remove(dup);
        if dup < keep {
            keep -= 1;
        }
    }
    keep
}

fn restore_order(messages: &mut [Message], index: usize) {
    let before_ok = index == 0 || messages[index - 1].created_at <= messages[index].created_at;
    let after_ok =
        index + 1 >= messages.len() || messages[index].created_at <= messages[index + 1].created_at;

    if !(before_ok && after_ok) {
        messages.sort_by_key(|m| m.created_at);
    }
}
