//! # scan-types
//!
//! Data model and wire types for didi-scan, the offline-first ticket scanner.
//!
//! This crate provides the foundational types used across all didi-scan crates:
//! - [`ScanId`], [`TicketId`], [`ControllerId`] - Identity types
//! - [`ScanAttempt`], [`QueuedScan`], [`DrainReport`] - Scan records
//! - [`ValidationOutcome`], [`FailureReason`] - Authority verdicts
//! - [`Session`] - Explicit controller session context
//! - [`ApiEnvelope`], [`ScanVerdict`] - Authority HTTP payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

mod api;
mod error;
mod ids;
mod outcome;
mod scan;
mod session;

pub use api::{
    ApiEnvelope, ControllerStats, HistoryEntry, LoginData, LoginRequest, ScanVerdict,
    TicketRecord,
};
pub use error::RecordError;
pub use ids::{ControllerId, ScanId, TicketId};
pub use outcome::{FailureReason, TicketSummary, ValidationOutcome, ValidationStatus};
pub use scan::{DrainReport, QueuedScan, ScanAttempt};
pub use session::{ControllerProfile, Credential, Session, CONTROLLER_ROLE};
