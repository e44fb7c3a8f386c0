//! HttpTransport - talks to the ticket authority over HTTP(S) with reqwest.

use super::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

/// Configuration for HttpTransport.
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// API base URL, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5555/api".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::ConnectionFailed(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::ReceiveFailed(e.to_string())
        }
    }
}

/// HttpTransport implements the Transport trait with a pooled reqwest client.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Example
///
/// ```ignore
/// let transport = HttpTransport::new(HttpTransportConfig {
///     base_url: "https://api.example.com/api".into(),
///     timeout: Duration::from_secs(10),
/// })?;
/// let response = transport.execute(ApiRequest::get(["tickets"])).await?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for the given base URL.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidRequest(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the full URL for a request. Segments are percent-encoded.
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TransportError::InvalidRequest(format!("{} cannot be a base", self.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(request.segments.iter());
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

/// Parse a response body: empty is `Null`, non-JSON is kept as a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request)?;
        debug!(method = ?request.method, path = %request.path(), "sending request");

        let mut builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        if let Some(credential) = &request.bearer {
            builder = builder.bearer_auth(credential.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        trace!(status, len = bytes.len(), "response received");

        Ok(ApiResponse::new(status, parse_body(&bytes)))
    }

    async fn probe(&self) -> bool {
        // Any HTTP answer, even an error status, means the authority is up.
        match self.http.get(self.base_url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "probe failed");
                false
            }
        }
    }
}
