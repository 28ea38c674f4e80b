//! Deterministic simulation harness for murmur sync testing.
//!
//! In-memory implementations of the Environment and Transport traits for
//! deterministic, reproducible testing on tokio's paused clock.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual monotonic time plus a controllable wall clock
//! - [`SimTransport`]: scriptable backend that records every call, serves
//!   in-memory feeds, and can echo accepted sends back on the message feed
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the common
//! sync and typing invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_transport;

pub use invariants::{
    Invariant, InvariantKind, InvariantRegistry, InvariantResult, MessagesSorted,
    NoPendingFailures, SingleClientIdPerConversation, SingleServerIdPerConversation,
    SystemSnapshot, TypingSetsNonEmpty, UnreadCountsPositive, VersionMonotonicity, Violation,
};
pub use sim_env::SimEnv;
pub use sim_transport::{SimTransport, TransportCall};
