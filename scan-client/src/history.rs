//! Scan history and controller statistics.
//!
//! Both ask a dedicated endpoint first and fall back to the plain ticket
//! list when the authority does not offer it. When the authority cannot be
//! reached at all, history shows the local queue and stats report only the
//! pending count, flagged `offline`.

use chrono::{DateTime, Local, NaiveDate};
use didi_scan_core::Resolver;
use didi_scan_types::{
    ApiEnvelope, ControllerStats, HistoryEntry, Session, TicketRecord, TicketSummary,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::queue::ScanQueue;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::validation::ValidationClient;

/// Ticket list size used to compute fallback statistics.
const STATS_SAMPLE: u32 = 1000;

/// Recent scans, newest first.
pub async fn history<T: Transport, Q: ScanQueue>(
    client: &ValidationClient<T>,
    queue: &Q,
    resolver: &Resolver,
    session: &Session,
    limit: u32,
) -> Result<Vec<HistoryEntry>, ClientError> {
    match remote_history(client, session, limit).await {
        Ok(entries) => Ok(entries),
        Err(e) if e.is_unreachable() => {
            info!("authority unreachable; showing local history");
            local_history(queue, resolver, limit).await
        }
        Err(ClientError::AuthExpired) => Err(ClientError::AuthExpired),
        Err(e) => {
            warn!(error = %e, "history unavailable");
            Ok(Vec::new())
        }
    }
}

/// Statistics for the logged-in controller, with the local pending count.
pub async fn stats<T: Transport, Q: ScanQueue>(
    client: &ValidationClient<T>,
    queue: &Q,
    session: &Session,
) -> Result<ControllerStats, ClientError> {
    let pending = queue.count().await? as u64;

    match remote_stats(client, session).await {
        Ok(stats) => Ok(ControllerStats { pending, ..stats }),
        Err(e) if e.is_unreachable() => Ok(ControllerStats {
            offline: true,
            pending,
            ..ControllerStats::default()
        }),
        Err(ClientError::AuthExpired) => Err(ClientError::AuthExpired),
        Err(e) => {
            warn!(error = %e, "stats unavailable");
            Ok(ControllerStats {
                pending,
                ..ControllerStats::default()
            })
        }
    }
}

async fn get<T: Transport>(
    client: &ValidationClient<T>,
    request: ApiRequest,
) -> Result<ApiResponse, ClientError> {
    let response = client.execute(request).await?;
    if response.is_unauthorized() {
        return Err(ClientError::AuthExpired);
    }
    Ok(response)
}

/// `GET /tickets` as a list of records, if the authority answered with one.
async fn ticket_list<T: Transport>(
    client: &ValidationClient<T>,
    request: ApiRequest,
) -> Result<Vec<TicketRecord>, ClientError> {
    let response = get(client, request).await?;
    let envelope = ApiEnvelope::from_body(&response.body);
    if !response.is_success() || !envelope.success {
        return Ok(Vec::new());
    }
    Ok(envelope
        .data
        .as_ref()
        .map(TicketRecord::list_from_data)
        .unwrap_or_default())
}

async fn remote_history<T: Transport>(
    client: &ValidationClient<T>,
    session: &Session,
    limit: u32,
) -> Result<Vec<HistoryEntry>, ClientError> {
    let response = get(
        client,
        ApiRequest::get(["tickets", "scans"])
            .with_query("limit", limit)
            .with_bearer(&session.credential),
    )
    .await?;
    if response.is_success() {
        return Ok(entries_from_body(&response.body));
    }

    debug!(status = response.status, "no scan history endpoint; using ticket list");
    let records = ticket_list(
        client,
        ApiRequest::get(["tickets"])
            .with_query("used", true)
            .with_query("limit", limit)
            .with_query("sortBy", "used_at")
            .with_query("sortOrder", "DESC")
            .with_bearer(&session.credential),
    )
    .await?;
    Ok(records.into_iter().map(entry_from_record).collect())
}

async fn remote_stats<T: Transport>(
    client: &ValidationClient<T>,
    session: &Session,
) -> Result<ControllerStats, ClientError> {
    let response = get(
        client,
        ApiRequest::get(["tickets", "stats", "controller"]).with_bearer(&session.credential),
    )
    .await?;
    if response.is_success() {
        let envelope = ApiEnvelope::from_body(&response.body);
        let data = envelope.data.unwrap_or(response.body);
        return serde_json::from_value(data)
            .map_err(|e| ClientError::Protocol(format!("stats response: {}", e)));
    }

    debug!(status = response.status, "no controller stats endpoint; computing from tickets");
    let records = ticket_list(
        client,
        ApiRequest::get(["tickets"])
            .with_query("limit", STATS_SAMPLE)
            .with_bearer(&session.credential),
    )
    .await?;
    Ok(compute_stats(&records, Local::now().date_naive()))
}

/// Queued scans as history, resolved the way replay will submit them.
async fn local_history<Q: ScanQueue>(
    queue: &Q,
    resolver: &Resolver,
    limit: u32,
) -> Result<Vec<HistoryEntry>, ClientError> {
    let scans = queue.list().await?;
    Ok(scans
        .iter()
        .rev()
        .take(limit as usize)
        .map(|scan| HistoryEntry {
            ticket_code: resolver
                .resolve_text(&scan.ticket_raw_payload)
                .as_str()
                .to_string(),
            timestamp: Some(scan.enqueued_at.to_rfc3339()),
            valid: false,
            ticket: None,
            offline: true,
        })
        .collect())
}

/// Statistics from a ticket list: every used ticket counts as a valid scan.
pub fn compute_stats(records: &[TicketRecord], today: NaiveDate) -> ControllerStats {
    let used = records.iter().filter(|r| r.used).count() as u64;
    let today_scans = records
        .iter()
        .filter_map(|r| r.used_at.as_deref())
        .filter_map(|at| DateTime::parse_from_rfc3339(at).ok())
        .filter(|at| at.with_timezone(&Local).date_naive() == today)
        .count() as u64;

    ControllerStats {
        today_scans,
        total_scans: used,
        valid_scans: used,
        invalid_scans: 0,
        offline: false,
        pending: 0,
    }
}

fn entries_from_body(body: &Value) -> Vec<HistoryEntry> {
    let data = body.get("data").filter(|d| !d.is_null()).unwrap_or(body);
    let items = data
        .as_array()
        .or_else(|| data.get("scans").and_then(Value::as_array));
    items
        .map(|items| items.iter().filter_map(entry_from_value).collect())
        .unwrap_or_default()
}

fn entry_from_value(value: &Value) -> Option<HistoryEntry> {
    let summary = TicketSummary::from_value(value.get("ticket").unwrap_or(value));
    let ticket_code =
        text(value, &["ticketCode", "ticketId", "code", "id"]).or(summary.code.clone())?;
    Some(HistoryEntry {
        ticket_code,
        timestamp: text(value, &["timestamp", "scannedAt", "createdAt", "usedAt"]),
        valid: value
            .get("valid")
            .or_else(|| value.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        ticket: Some(summary),
        offline: false,
    })
}

fn entry_from_record(record: TicketRecord) -> HistoryEntry {
    HistoryEntry {
        ticket_code: record.id,
        timestamp: record.used_at,
        valid: record.used,
        ticket: Some(record.summary),
        offline: false,
    }
}

fn text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
