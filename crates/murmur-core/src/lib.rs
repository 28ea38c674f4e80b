//! Core contracts for the murmur synchronization core.
//!
//! The state machines in `murmur-client` are pure: they never touch the
//! network, clocks or timers themselves. This crate defines the seams they are
//! driven through.
//!
//! # Components
//!
//! - [`Environment`]: monotonic time, sleeping and the wall clock
//! - [`SystemEnv`]: production environment backed by the OS and tokio
//! - [`Transport`]: the networking layer's contract (join/leave, feeds,
//!   send, read markers, reactions, typing)
//! - [`SyncConfig`] / [`TypingConfig`]: tunables with production defaults

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod transport;

pub use config::{SyncConfig, TypingConfig};
pub use env::{Environment, SystemEnv};
pub use error::TransportError;
pub use transport::{EventStream, MessageStream, OutgoingMessage, SendReceipt, Transport};
