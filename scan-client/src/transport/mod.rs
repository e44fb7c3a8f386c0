//! Transport abstraction for didi-scan.
//!
//! This module provides a pluggable request/response layer that abstracts
//! how requests reach the ticket authority (HTTP, mock for testing).
//!
//! # Design
//!
//! The transport knows nothing about tickets. It carries an [`ApiRequest`]
//! and returns whatever status and JSON body came back. Interpreting the
//! answer (verdict, rejection, expired session) is the validation client's
//! job. The one thing the transport must get right is telling "no answer"
//! apart from "an answer": every failure to obtain a response is a
//! [`TransportError`], and [`TransportError::is_unreachable`] says whether
//! the scan should be queued.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_response(200, json!({ "success": true, "data": { "success": true } }));
//! let response = transport.execute(ApiRequest::post(["tickets", "DIDI-1", "scan"])).await?;
//! assert_eq!(response.status, 200);
//! ```

mod http;
mod mock;

pub use http::{HttpTransport, HttpTransportConfig};
pub use mock::MockTransport;

use async_trait::async_trait;
use didi_scan_types::Credential;
use serde_json::Value;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed (refused, DNS, no route).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Receiving the response failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// No response within the allowed time.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built (bad base URL, bad path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether this failure means the authority could not be reached.
    ///
    /// Unreachable submissions are queued; anything else is surfaced.
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// One request to the authority.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path segments below the API base URL, unencoded.
    pub segments: Vec<String>,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Bearer credential.
    pub bearer: Option<Credential>,
    /// JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    /// A GET request.
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Get, segments)
    }

    /// A POST request.
    pub fn post<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::Post, segments)
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Authenticate with a bearer credential.
    pub fn with_bearer(mut self, credential: &Credential) -> Self {
        self.bearer = Some(credential.clone());
        self
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The path as `/a/b/c` (unencoded, for logs and mock matching).
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// A response from the authority.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401: the credential was refused.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Statuses that mean "try again later" rather than a verdict.
    pub fn is_transient(&self) -> bool {
        self.status >= 500 || self.status == 408 || self.status == 429
    }
}

/// Transport trait for talking to the ticket authority.
///
/// Implementations handle the underlying connection mechanism
/// (HTTP, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request and return the response, whatever its status.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Check whether the authority answers at all.
    async fn probe(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_requests_are_reachable_failures() {
        assert!(TransportError::ConnectionFailed("refused".into()).is_unreachable());
        assert!(TransportError::ConnectionClosed.is_unreachable());
        assert!(TransportError::ReceiveFailed("reset".into()).is_unreachable());
        assert!(TransportError::Timeout.is_unreachable());
        assert!(!TransportError::InvalidRequest("bad url".into()).is_unreachable());
    }

    #[test]
    fn request_builder() {
        let credential = Credential::new("tok");
        let request = ApiRequest::get(["tickets"])
            .with_query("limit", 50)
            .with_bearer(&credential);

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path(), "/tickets");
        assert_eq!(request.query, vec![("limit".to_string(), "50".to_string())]);
        assert_eq!(request.bearer, Some(credential));
    }

    #[test]
    fn request_path_is_unencoded() {
        let request = ApiRequest::post(["tickets", "DIDI 1/2", "scan"]);
        assert_eq!(request.path(), "/tickets/DIDI 1/2/scan");
        assert_eq!(request.segments.len(), 3);
    }

    #[test]
    fn response_status_classes() {
        assert!(ApiResponse::new(201, Value::Null).is_success());
        assert!(ApiResponse::new(401, Value::Null).is_unauthorized());
        assert!(ApiResponse::new(503, Value::Null).is_transient());
        assert!(ApiResponse::new(429, Value::Null).is_transient());
        assert!(!ApiResponse::new(400, Value::Null).is_transient());
    }
}
