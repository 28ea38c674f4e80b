//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during system execution.
//! Unlike example-based tests that check specific scenarios, invariants
//! verify behavioral properties across all possible execution paths.
//!
//! # Architecture
//!
//! The invariant system reads the published snapshots of both components
//! into a [`SystemSnapshot`], then runs registered [`Invariant`] checks
//! against it. Violations trigger panics with detailed context for debugging.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = SystemSnapshot::new(sync.state(), typing.state());
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    MessagesSorted, NoPendingFailures, SingleClientIdPerConversation, SingleServerIdPerConversation,
    TypingSetsNonEmpty, UnreadCountsPositive, VersionMonotonicity,
};
use serde::Serialize;
pub use snapshot::SystemSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Identifies a registered invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantKind {
    /// See [`MessagesSorted`].
    MessagesSorted,
    /// See [`SingleClientIdPerConversation`].
    SingleClientIdPerConversation,
    /// See [`SingleServerIdPerConversation`].
    SingleServerIdPerConversation,
    /// See [`NoPendingFailures`].
    NoPendingFailures,
    /// See [`UnreadCountsPositive`].
    UnreadCountsPositive,
    /// See [`TypingSetsNonEmpty`].
    TypingSetsNonEmpty,
    /// See [`VersionMonotonicity`].
    VersionMonotonicity,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessagesSorted => "messages_sorted",
            Self::SingleClientIdPerConversation => "single_client_id_per_conversation",
            Self::SingleServerIdPerConversation => "single_server_id_per_conversation",
            Self::NoPendingFailures => "no_pending_failures",
            Self::UnreadCountsPositive => "unread_counts_positive",
            Self::TypingSetsNonEmpty => "typing_sets_non_empty",
            Self::VersionMonotonicity => "version_monotonicity",
        };
        f.write_str(name)
    }
}

/// Invariant violation with context.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Violated invariant.
    pub invariant: InvariantKind,
    /// Description of what went wrong.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against system state.
///
/// Invariants are behavioral properties that must always hold.
/// They capture WHAT must be true, not specific test scenarios.
pub trait Invariant: Send + Sync {
    /// Which invariant this is.
    fn kind(&self) -> InvariantKind;

    /// Check the invariant against the current state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against system state.
/// Use [`InvariantRegistry::standard()`] for the common invariants.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every standard invariant.
    ///
    /// Includes:
    /// - [`MessagesSorted`]: collections ascend by `created_at`
    /// - [`SingleClientIdPerConversation`]: echoes reconcile, never duplicate
    /// - [`SingleServerIdPerConversation`]: redeliveries never duplicate
    /// - [`NoPendingFailures`]: pending and failed are exclusive
    /// - [`UnreadCountsPositive`]: no stale zero counters
    /// - [`TypingSetsNonEmpty`]: empty typing sets drop their key
    /// - [`VersionMonotonicity`]: snapshot versions never decrease
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MessagesSorted);
        registry.add(SingleClientIdPerConversation);
        registry.add(SingleServerIdPerConversation);
        registry.add(NoPendingFailures);
        registry.add(UnreadCountsPositive);
        registry.add(TypingSetsNonEmpty);
        registry.add(VersionMonotonicity);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking on first violation.
    ///
    /// Use this in tests where you want immediate failure with context.
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
