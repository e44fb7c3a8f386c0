//! Validation client: submits one scan to the ticket authority.
//!
//! One round trip per call, bounded by a timeout. The answer is always one
//! of three things:
//!
//! - a definitive verdict (`Accepted` / `Rejected` with a reason),
//! - `Unreachable` (no answer, or an answer that means "try later"),
//! - [`ClientError::AuthExpired`] when the credential was refused.
//!
//! The client never queues anything itself; that is the caller's decision.

use didi_scan_core::classify;
use didi_scan_types::{ApiEnvelope, ScanVerdict, Session, TicketId, TicketSummary, ValidationOutcome};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Message for accepted tickets when the authority sends none.
pub const ACCEPTED_MESSAGE: &str = "Billet valide";

/// Message for rejected tickets when the authority sends none.
pub const REJECTED_MESSAGE: &str = "Billet invalide";

/// Message for unreachable submissions.
pub const UNREACHABLE_MESSAGE: &str = "Serveur injoignable";

/// Submits scans (and the other authority calls) over a [`Transport`].
#[derive(Debug)]
pub struct ValidationClient<T: Transport> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> ValidationClient<T> {
    /// Create a client with the default timeout.
    pub fn new(transport: T) -> Self {
        Self::with_timeout(transport, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout.
    pub fn with_timeout(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a request, mapping an elapsed timeout to [`TransportError::Timeout`].
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Submit one scan for `ticket_id`.
    pub async fn submit(
        &self,
        session: &Session,
        ticket_id: &TicketId,
    ) -> Result<ValidationOutcome, ClientError> {
        let request = ApiRequest::post(["tickets", ticket_id.as_str(), "scan"])
            .with_bearer(&session.credential);
        debug!(ticket = %ticket_id, controller = %session.controller_id, "submitting scan");

        match self.execute(request).await {
            Ok(response) => interpret(ticket_id, &response),
            Err(e) if e.is_unreachable() => {
                warn!(ticket = %ticket_id, error = %e, "authority unreachable");
                Ok(ValidationOutcome::unreachable(UNREACHABLE_MESSAGE))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Turn an authority response into an outcome.
///
/// Only a reply in the authority's envelope can reject a ticket. Anything
/// else (a proxy error page, a captive portal, an empty body) carries no
/// verdict and is reported as `Unreachable`, so queued scans are kept.
pub fn interpret(ticket_id: &TicketId, response: &ApiResponse) -> Result<ValidationOutcome, ClientError> {
    if response.is_unauthorized() {
        return Err(ClientError::AuthExpired);
    }

    let Some(envelope) = ApiEnvelope::parse(&response.body) else {
        return Ok(no_verdict(ticket_id, response));
    };
    let verdict = envelope.data.as_ref().and_then(ScanVerdict::from_data);
    let fallback_summary = || Some(TicketSummary::with_code(ticket_id.as_str()));

    if response.is_success() {
        return Ok(match verdict {
            Some(verdict) if envelope.success => {
                let summary = verdict.summary().or_else(fallback_summary);
                if verdict.success {
                    ValidationOutcome::accepted(
                        verdict.message.unwrap_or_else(|| ACCEPTED_MESSAGE.into()),
                        summary,
                    )
                } else {
                    reject(verdict.message, summary)
                }
            }
            _ if !envelope.success => reject(
                envelope.error_text().map(str::to_string),
                fallback_summary(),
            ),
            _ => no_verdict(ticket_id, response),
        });
    }

    if let Some(verdict) = verdict {
        let summary = verdict.summary().or_else(fallback_summary);
        return Ok(reject(verdict.message, summary));
    }

    if response.is_transient() || envelope.success {
        return Ok(no_verdict(ticket_id, response));
    }

    Ok(reject(
        envelope.error_text().map(str::to_string),
        fallback_summary(),
    ))
}

fn no_verdict(ticket_id: &TicketId, response: &ApiResponse) -> ValidationOutcome {
    warn!(ticket = %ticket_id, status = response.status, "no verdict in authority reply");
    ValidationOutcome::unreachable(format!("{} ({})", UNREACHABLE_MESSAGE, response.status))
}

fn reject(message: Option<String>, summary: Option<TicketSummary>) -> ValidationOutcome {
    let reason = classify(message.as_deref());
    ValidationOutcome::rejected(
        reason,
        message.unwrap_or_else(|| REJECTED_MESSAGE.into()),
        summary,
    )
}
