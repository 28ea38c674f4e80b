//! Feed subscription table.
//!
//! Each joined (or watched) conversation owns one subscription: the
//! forwarder tasks that pump its transport feeds into the runtime mailbox.
//! Every forwarded item is tagged with the subscription id it came from, so
//! items still queued in the mailbox after a close are recognised as stale
//! and dropped.

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use murmur_proto::ConversationId;
use tokio::{sync::mpsc, task::AbortHandle};

/// Identifies one opening of a conversation's feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionId(u64);

/// Item read from a feed, tagged with its origin.
#[derive(Debug)]
pub(crate) struct FeedItem<T> {
    pub conversation_id: ConversationId,
    pub subscription: SubscriptionId,
    pub payload: T,
}

struct Subscription {
    id: SubscriptionId,
    tasks: Vec<AbortHandle>,
}

impl Subscription {
    fn cancel(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Open feed subscriptions, at most one per conversation.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_id: u64,
    entries: HashMap<ConversationId, Subscription>,
}

impl SubscriptionTable {
    /// Reserve the id for the next subscription.
    pub fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    /// Register the forwarders of a freshly opened subscription.
    ///
    /// A subscription already open for the conversation is cancelled first.
    pub fn insert(&mut self, conversation_id: ConversationId, id: SubscriptionId, tasks: Vec<AbortHandle>) {
        if let Some(previous) = self.entries.insert(conversation_id, Subscription { id, tasks }) {
            previous.cancel();
        }
    }

    /// Cancel a conversation's subscription. Returns whether one was open.
    pub fn close(&mut self, conversation_id: &ConversationId) -> bool {
        match self.entries.remove(conversation_id) {
            Some(subscription) => {
                subscription.cancel();
                true
            },
            None => false,
        }
    }

    /// Cancel every subscription. Returns how many were open.
    pub fn close_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, subscription) in self.entries.drain() {
            subscription.cancel();
        }
        count
    }

    /// Whether `id` is the live subscription for the conversation.
    pub fn is_current(&self, conversation_id: &ConversationId, id: SubscriptionId) -> bool {
        self.entries.get(conversation_id).is_some_and(|s| s.id == id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Drop for SubscriptionTable {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Spawn a task pumping `feed` into `mailbox`, wrapping each item.
///
/// The task ends when the feed ends, when the mailbox closes, or when it is
/// aborted through the returned handle.
pub(crate) fn spawn_forwarder<S, T, M, F>(feed: S, mailbox: mpsc::Sender<M>, wrap: F) -> AbortHandle
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
    M: Send + 'static,
    F: Fn(T) -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut feed = std::pin::pin!(feed);
        while let Some(item) = feed.next().await {
            if mailbox.send(wrap(item)).await.is_err() {
                break;
            }
        }
    })
    .abort_handle()
}
