//! Scan records: ephemeral attempts and durable queued scans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ControllerId, RecordError, ScanId, TicketId};

/// One decode event turned into a submission. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanAttempt {
    /// Text exactly as decoded from the ticket code.
    pub raw_payload: String,
    /// Canonical ticket id resolved from the payload.
    pub resolved_ticket_id: TicketId,
    /// When the attempt was made.
    pub submitted_at: DateTime<Utc>,
}

impl ScanAttempt {
    /// Create an attempt stamped with the current time.
    pub fn new(raw_payload: impl Into<String>, resolved_ticket_id: TicketId) -> Self {
        Self {
            raw_payload: raw_payload.into(),
            resolved_ticket_id,
            submitted_at: Utc::now(),
        }
    }
}

/// A scan waiting to be replayed against the authority.
///
/// Persisted as one JSON object:
/// `{ id, ticketRawPayload, controllerId, enqueuedAt, attempts }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedScan {
    /// Unique, stable id.
    pub id: ScanId,
    /// The raw decoded payload (resolved again on replay).
    pub ticket_raw_payload: String,
    /// Controller who performed the scan.
    pub controller_id: ControllerId,
    /// When the scan entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedScan {
    /// Create a fresh record with a new id and zero attempts.
    pub fn new(ticket_raw_payload: impl Into<String>, controller_id: ControllerId) -> Self {
        Self {
            id: ScanId::new(),
            ticket_raw_payload: ticket_raw_payload.into(),
            controller_id,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// A copy of this record with one more failed attempt.
    ///
    /// Records are replaced, never edited in place.
    pub fn with_failed_attempt(&self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(RecordError::Malformed)
    }

    /// Parse one stored line, migrating records written by the previous
    /// scanner app (`ticketCode`, `timestamp`, `controller`, numeric ids).
    pub fn from_json_line(line: &str) -> Result<Self, RecordError> {
        let stored: StoredScan = serde_json::from_str(line).map_err(RecordError::Malformed)?;

        let ticket_raw_payload = stored
            .ticket_raw_payload
            .ok_or(RecordError::MissingField("ticketRawPayload"))?;

        let id = match &stored.id {
            Some(Value::String(s)) => ScanId::parse(s),
            _ => None,
        }
        .unwrap_or_else(|| ScanId::derived(line.trim().as_bytes()));

        Ok(Self {
            id,
            ticket_raw_payload,
            controller_id: stored
                .controller_id
                .map(ControllerId::new)
                .unwrap_or_else(ControllerId::unknown),
            enqueued_at: stored.enqueued_at.unwrap_or_default(),
            attempts: stored.attempts,
        })
    }
}

/// Lenient on-disk shape accepted by [`QueuedScan::from_json_line`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredScan {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "ticketCode")]
    ticket_raw_payload: Option<String>,
    #[serde(default, alias = "controller")]
    controller_id: Option<String>,
    #[serde(default, alias = "timestamp")]
    enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attempts: u32,
}

/// Counts reported by one drain of the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Items the authority accepted.
    pub synced: u32,
    /// Items that could not reach the authority and stay queued.
    pub failed: u32,
}
