//! Deterministic simulation harness for Threadline testing.
//!
//! An in-memory chat service ([`SimServer`]) and its clients ([`SimBackend`])
//! implementing [`threadline_app::ChatBackend`], for deterministic,
//! reproducible multi-user tests. Channel URLs come from a seeded RNG,
//! timestamps from a logical clock, and any request can be made to fail with
//! [`SimServer::fail_next`].
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the client
//! state invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_backend;
pub mod sim_server;

pub use invariants::{
    ActiveChannelCached, ClientSnapshot, Invariant, InvariantRegistry, InvariantResult,
    MessagesInActiveChannel, RepliesOrdered, RepliesOutsideTopLevel, SystemSnapshot,
    ThreadRequiresActiveChannel, TopLevelOrdered, UniqueMessageIds, Violation,
};
pub use sim_backend::SimBackend;
pub use sim_server::{SimOperation, SimServer};
