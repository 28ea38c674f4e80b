//! Client
//!
//! Action-based state machines for the murmur synchronization core. Keeps a
//! local view of conversations, messages and typing activity consistent with
//! a remote backend under unreliable, asynchronous delivery.
//!
//! # Architecture
//!
//! Both components are Sans-IO. They receive events (user intents, transport
//! results, feed items, timer ticks), mutate their state, and return actions
//! for the caller to execute. Time is always passed in; no component reads a
//! clock or arms a timer on its own.
//!
//! # Components
//!
//! - [`ConversationSync`]: conversation list, per-conversation message
//!   collections, unread counters, active conversation and the join/leave
//!   subscription lifecycle
//! - [`TypingCoordinator`]: the local user's debounced, auto-expiring typing
//!   signal and the remote typing indicators per conversation
//! - [`reconcile`]: ordering and optimistic-message reconciliation helpers
//!
//! The two components never call into each other. Each owns its own feed
//! handles and consumes the disjoint subset of event types it understands.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod conversation;
mod error;
pub mod reconcile;
mod typing;

pub use conversation::{
    ConversationSync, ConversationSyncState, HistoryCursor, SyncAction, SyncEvent, SyncStatus,
};
pub use error::{SyncError, TypingError};
pub use typing::{TypingAction, TypingCoordinator, TypingEvent, TypingState};
