//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent requests for verification.

use super::{ApiRequest, ApiResponse, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Scripted = Result<ApiResponse, TransportError>;

/// Mock transport for testing.
///
/// Responses are served from a per-path script first, then from a shared
/// FIFO. With nothing scripted the request fails with
/// [`TransportError::ConnectionClosed`], which callers treat as unreachable.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    offline: bool,
    delay: Option<Duration>,
    sent_requests: Vec<ApiRequest>,
    response_queue: VecDeque<Scripted>,
    path_responses: HashMap<String, VecDeque<Scripted>>,
    fail_next: Option<TransportError>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response for the next request on any path.
    pub fn queue_response(&self, status: u16, body: Value) {
        self.inner()
            .response_queue
            .push_back(Ok(ApiResponse::new(status, body)));
    }

    /// Queue a failure for the next request on any path.
    pub fn queue_failure(&self, error: TransportError) {
        self.inner().response_queue.push_back(Err(error));
    }

    /// Queue a response for the next request on `path` (e.g. `/tickets/DIDI-1/scan`).
    pub fn respond_to(&self, path: &str, status: u16, body: Value) {
        self.inner()
            .path_responses
            .entry(path.to_string())
            .or_default()
            .push_back(Ok(ApiResponse::new(status, body)));
    }

    /// Cause the next request to fail with the given error.
    pub fn fail_next(&self, error: TransportError) {
        self.inner().fail_next = Some(error);
    }

    /// While offline every request fails with `ConnectionFailed` and probes report down.
    pub fn set_offline(&self, offline: bool) {
        self.inner().offline = offline;
    }

    /// Delay every response (for timeout and concurrency tests).
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.inner().delay = delay;
    }

    /// Get all requests that were sent.
    pub fn sent_requests(&self) -> Vec<ApiRequest> {
        self.inner().sent_requests.clone()
    }

    /// Get the last request that was sent.
    pub fn last_sent(&self) -> Option<ApiRequest> {
        self.inner().sent_requests.last().cloned()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.inner().sent_requests.len()
    }

    /// Clear all state (requests, scripts, failures).
    pub fn reset(&self) {
        *self.inner() = MockTransportInner::default();
    }

    fn next_response(&self, request: &ApiRequest) -> Scripted {
        let mut inner = self.inner();

        if inner.offline {
            return Err(TransportError::ConnectionFailed("network unreachable".into()));
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next.take() {
            return Err(error);
        }

        if let Some(scripted) = inner
            .path_responses
            .get_mut(&request.path())
            .and_then(VecDeque::pop_front)
        {
            return scripted;
        }

        inner
            .response_queue
            .pop_front()
            .unwrap_or(Err(TransportError::ConnectionClosed))
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let delay = {
            let mut inner = self.inner();
            inner.sent_requests.push(request.clone());
            inner.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.next_response(&request)
    }

    async fn probe(&self) -> bool {
        !self.inner().offline
    }
}
