//! Data model for the murmur synchronization core.
//!
//! Everything that crosses the transport boundary lives here: typed
//! identifiers, [`Message`] and [`Conversation`] records, and the
//! discriminated event feed ([`RawEvent`] on the wire, [`FeedEvent`] once
//! decoded).
//!
//! # Wire format
//!
//! Records use camelCase JSON field names. Feed events arrive as
//! `{"event": <name>, "payload": <object>}`; only the four event names in
//! [`FeedEvent`] are understood, everything else decodes to
//! [`FeedEvent::Unknown`] so that newer backends never break older clients.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod event;
pub mod ids;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use event::{FeedEvent, RawEvent};
pub use ids::{ClientId, ConversationId, MessageId, UserId};
pub use message::{Conversation, Message, MessagePage, MessageType, Reaction};
