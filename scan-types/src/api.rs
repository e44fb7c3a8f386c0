//! Wire types for the ticket authority's HTTP API.
//!
//! Every response is wrapped in the same envelope:
//! `{ "success": bool, "data": ..., "message": "...", "error": "..." }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{ControllerProfile, TicketSummary};

/// Response envelope shared by all authority endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiEnvelope {
    /// Whether the request succeeded at the API level.
    #[serde(default)]
    pub success: bool,
    /// Endpoint-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error text on failures.
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiEnvelope {
    /// Parse an envelope from a response body. Non-envelope bodies yield the default.
    pub fn from_body(body: &Value) -> Self {
        serde_json::from_value(body.clone()).unwrap_or_default()
    }

    /// Parse a body only if it has the authority's envelope shape: a JSON
    /// object with a boolean `success` or an object `data`.
    ///
    /// Proxy pages, captive portals and empty bodies yield `None`.
    pub fn parse(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        let shaped = object.get("success").is_some_and(Value::is_boolean)
            || object.get("data").is_some_and(Value::is_object);
        if !shaped {
            return None;
        }
        serde_json::from_value(body.clone()).ok()
    }

    /// Best human-readable text: `error` first, then `message`.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

/// Payload of `POST /tickets/{id}/scan`, inside `data`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScanVerdict {
    /// Whether the ticket was accepted.
    #[serde(default)]
    pub success: bool,
    /// Verdict message (bilingual text from the authority).
    #[serde(default)]
    pub message: Option<String>,
    /// Free-form details.
    #[serde(default)]
    pub details: Option<Value>,
    /// Ticket object, if the authority knows the ticket.
    #[serde(default)]
    pub ticket: Option<Value>,
}

impl ScanVerdict {
    /// Parse a verdict from the envelope's `data` value.
    pub fn from_data(data: &Value) -> Option<Self> {
        if !data.is_object() {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }

    /// Ticket summary with `details` attached, if the authority sent a ticket.
    pub fn summary(&self) -> Option<TicketSummary> {
        let mut summary = self.ticket.as_ref().map(TicketSummary::from_value)?;
        summary.details = self.details.clone();
        Some(summary)
    }
}

/// Body of `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Password, sent once and never stored.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Payload of a successful login, inside `data`.
#[derive(Clone, Deserialize)]
pub struct LoginData {
    /// Bearer token.
    pub token: String,
    /// The logged-in user.
    pub user: ControllerProfile,
}

impl fmt::Debug for LoginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginData")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// One ticket as listed by `GET /tickets`.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketRecord {
    /// Ticket id (rendered as text).
    pub id: String,
    /// Whether the ticket has been redeemed.
    pub used: bool,
    /// When it was redeemed.
    pub used_at: Option<String>,
    /// Summary fields.
    pub summary: TicketSummary,
}

impl TicketRecord {
    /// Parse one entry of the ticket list. Entries without an id are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let summary = TicketSummary::from_value(value);
        let id = summary.code.clone()?;
        Some(Self {
            id,
            used: value.get("used").and_then(Value::as_bool).unwrap_or(false),
            used_at: summary.used_at.clone(),
            summary,
        })
    }

    /// Parse the `{ tickets: [...] }` payload of `GET /tickets`.
    pub fn list_from_data(data: &Value) -> Vec<Self> {
        data.get("tickets")
            .and_then(Value::as_array)
            .map(|tickets| tickets.iter().filter_map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

/// One line of scan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Ticket code that was scanned.
    pub ticket_code: String,
    /// When it was scanned.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Whether the scan was valid.
    #[serde(default)]
    pub valid: bool,
    /// Ticket summary, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketSummary>,
    /// Whether this entry is a locally queued scan not yet synced.
    #[serde(default)]
    pub offline: bool,
}

/// Controller statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStats {
    /// Scans made today.
    #[serde(default)]
    pub today_scans: u64,
    /// All scans.
    #[serde(default)]
    pub total_scans: u64,
    /// Scans that were valid.
    #[serde(default)]
    pub valid_scans: u64,
    /// Scans that were rejected.
    #[serde(default)]
    pub invalid_scans: u64,
    /// Computed while offline.
    #[serde(default)]
    pub offline: bool,
    /// Scans waiting in the local queue.
    #[serde(default)]
    pub pending: u64,
}
