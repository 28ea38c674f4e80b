//! Application runtimes for murmur
//!
//! Async drivers for the Sans-IO state machines in `murmur-client`. Each
//! component runs as a single tokio task that owns its state machine, reads
//! a bounded intent mailbox, executes the actions it gets back against a
//! [`Transport`](murmur_core::Transport), and publishes immutable snapshots
//! through a `watch` channel.
//!
//! # Components
//!
//! - [`spawn_sync`] / [`SyncHandle`]: conversation sync runtime
//! - [`spawn_typing`] / [`TypingHandle`]: typing runtime with its ticker
//! - [`Session`]: both runtimes over one transport
//!
//! # Feed subscriptions
//!
//! Feeds are pumped into the owning runtime's mailbox by forwarder tasks.
//! Each item carries the id of the subscription it was read from; items from
//! a subscription that has since been closed are dropped on arrival, so
//! nothing is processed for a conversation after it was left.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod session;
mod subscription;
mod sync;
mod typing;

pub use error::SessionError;
pub use session::Session;
pub use sync::{SyncHandle, spawn_sync};
pub use typing::{TypingHandle, spawn_typing};
