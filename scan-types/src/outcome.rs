//! Validation outcomes reported by the ticket authority.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Why the authority rejected a scan.
///
/// Closed set; anything the authority says that does not match a known
/// keyword group maps to [`FailureReason::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The ticket has already been redeemed.
    AlreadyUsed,
    /// The authority does not know this ticket.
    NotFound,
    /// The ticket is past its validity window.
    Expired,
    /// The ticket was cancelled.
    Cancelled,
    /// Any other rejection.
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::AlreadyUsed => "already_used",
            FailureReason::NotFound => "not_found",
            FailureReason::Expired => "expired",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result class of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// The authority accepted the ticket.
    Accepted,
    /// The authority gave a definitive rejection.
    Rejected,
    /// The authority could not be reached; the scan should be queued.
    Unreachable,
}

/// Ticket fields the authority may return alongside a verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    /// Ticket code as known by the authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Name of the ticket holder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Ticket category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Seat assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    /// When the ticket was previously redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<String>,
    /// Free-form details object from the authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TicketSummary {
    /// Summary carrying only a ticket code.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Build a summary from the authority's loosely-shaped ticket object.
    ///
    /// The authority uses several spellings across endpoints
    /// (`code`/`ticketCode`/`id`, `customerName`/`name`, `usedAt`/`used_at`);
    /// the first present one wins.
    pub fn from_value(value: &Value) -> Self {
        Self {
            code: first_text(value, &["code", "ticketCode", "id"]),
            customer_name: first_text(value, &["customerName", "name"]),
            category: first_text(value, &["category"]),
            seat: first_text(value, &["seat"]),
            used_at: first_text(value, &["usedAt", "used_at"]),
            details: None,
        }
    }
}

/// First string-or-number field among `keys`, rendered as text.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Outcome of one submission attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Accepted, rejected, or unreachable.
    pub status: ValidationStatus,
    /// Rejection reason; present only for [`ValidationStatus::Rejected`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Ticket fields returned by the authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_summary: Option<TicketSummary>,
    /// Human-readable message.
    pub message: String,
}

impl ValidationOutcome {
    /// The authority accepted the ticket.
    pub fn accepted(message: impl Into<String>, summary: Option<TicketSummary>) -> Self {
        Self {
            status: ValidationStatus::Accepted,
            reason: None,
            ticket_summary: summary,
            message: message.into(),
        }
    }

    /// The authority rejected the ticket for `reason`.
    pub fn rejected(
        reason: FailureReason,
        message: impl Into<String>,
        summary: Option<TicketSummary>,
    ) -> Self {
        Self {
            status: ValidationStatus::Rejected,
            reason: Some(reason),
            ticket_summary: summary,
            message: message.into(),
        }
    }

    /// The authority could not be reached.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Unreachable,
            reason: None,
            ticket_summary: None,
            message: message.into(),
        }
    }

    /// Whether this outcome is a verdict from the authority (not a retry candidate).
    pub fn is_definitive(&self) -> bool {
        matches!(
            self.status,
            ValidationStatus::Accepted | ValidationStatus::Rejected
        )
    }

    /// Whether the ticket was accepted.
    pub fn is_accepted(&self) -> bool {
        self.status == ValidationStatus::Accepted
    }
}
