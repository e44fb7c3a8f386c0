//! # scan-core
//!
//! Pure logic for didi-scan (no I/O, instant tests).
//!
//! This crate implements the decision rules and state machines of the
//! offline-first scan engine without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (authority requests, queue files) is performed by
//! `scan-client`, which feeds these modules and acts on their answers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connectivity;
pub mod drain;
pub mod lifecycle;
pub mod reason;
pub mod resolver;

pub use connectivity::{Connectivity, Transition};
pub use drain::{decide, DrainDecision, DrainTally, ReplayResult, RetryPolicy};
pub use lifecycle::{LifecycleEvent, ScanState};
pub use reason::{classify, classify_with, KeywordGroup, Language, REASON_TABLE};
pub use resolver::{resolve, Payload, Resolver, DEFAULT_TICKET_PREFIX, ID_FIELDS};
