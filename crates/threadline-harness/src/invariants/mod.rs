//! Client state invariants.
//!
//! Each check looks at the snapshots published by one or more chat clients
//! and reports a [`Violation`] when the displayed lists contradict each
//! other: a thread outside the active channel, a message shown twice, a
//! reply in the channel list, or lists out of chronological order.
//!
//! Tests wrap controller snapshots in a [`SystemSnapshot`] and run the
//! [`InvariantRegistry::standard`] set after every step:
//!
//! ```ignore
//! let snapshot = SystemSnapshot::single(ClientSnapshot::new("alice", controller.snapshot()));
//! InvariantRegistry::standard().assert_all(&snapshot, "after join");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ActiveChannelCached, MessagesInActiveChannel, RepliesOrdered, RepliesOutsideTopLevel,
    ThreadRequiresActiveChannel, TopLevelOrdered, UniqueMessageIds,
};
pub use snapshot::{ClientSnapshot, SystemSnapshot};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant, with the client and message involved.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Check that failed.
    pub invariant: &'static str,
    /// Which client, and which channel or message, is inconsistent.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of client snapshots that no sequence of operations or pushes
/// may break.
pub trait Invariant: Send + Sync {
    /// Name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check every client in `state`, stopping at the first inconsistency.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Set of checks run together against a [`SystemSnapshot`].
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

    /// Every client state check:
    /// - [`ActiveChannelCached`]: active channel is in the channel cache
    /// - [`MessagesInActiveChannel`]: top-level list belongs to the active
    ///   channel
    /// - [`ThreadRequiresActiveChannel`]: open thread belongs to the active
    ///   channel
    /// - [`UniqueMessageIds`]: no message is displayed twice
    /// - [`RepliesOutsideTopLevel`]: replies only appear in their thread
    /// - [`TopLevelOrdered`] / [`RepliesOrdered`]: lists run oldest first
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(ActiveChannelCached);
        registry.add(MessagesInActiveChannel);
        registry.add(ThreadRequiresActiveChannel);
        registry.add(UniqueMessageIds);
        registry.add(RepliesOutsideTopLevel);
        registry.add(TopLevelOrdered);
        registry.add(RepliesOrdered);
        registry
    }

    /// Register another check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every check, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and fail the calling test with all violations,
    /// labelled with `context` (usually the step just applied).
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("client state inconsistent {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True when no check is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_covers_every_check() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn no_clients_means_no_violations() {
        let registry = InvariantRegistry::standard();
        let snapshot = SystemSnapshot::empty();
        assert!(registry.check_all(&snapshot).is_ok());
    }
}
