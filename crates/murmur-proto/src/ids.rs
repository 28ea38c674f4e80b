//! Typed identifiers.
//!
//! All identifiers are opaque strings assigned by the backend, except
//! [`ClientId`], which the local client mints for optimistic messages and
//! which the backend echoes back unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(
    /// Conversation identifier.
    ConversationId
);

string_id!(
    /// Server-assigned message identifier. Absent until the backend confirms a
    /// message.
    MessageId
);

string_id!(
    /// Client-generated correlation id for locally originated messages.
    ///
    /// Used only to reconcile an optimistic message with its server echo;
    /// never shown to other users.
    ClientId
);

string_id!(
    /// User identifier.
    UserId
);

impl ClientId {
    /// Mint a correlation id from the wall clock and a local sequence number.
    ///
    /// The sequence keeps ids unique when several messages are sent within
    /// the same millisecond.
    pub fn generate(wall_clock_millis: i64, sequence: u64) -> Self {
        Self(format!("{wall_clock_millis}-{sequence}"))
    }
}
