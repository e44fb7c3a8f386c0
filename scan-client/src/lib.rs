//! # scan-client
//!
//! Offline-first scan submission and sync engine for didi-scan.
//!
//! This is the library that scanner hosts (the CLI, a kiosk app) build on.
//!
//! ## Features
//!
//! - **Live validation**: one bounded round trip per scan, typed outcome
//! - **Offline queue**: durable JSONL queue, nothing lost across restarts
//! - **Sync coordinator**: single-flight FIFO replay on reconnect
//! - **Transport abstraction**: pluggable transport layer (HTTP, mock)
//! - **Pure decisions**: uses scan-core for side-effect-free rules
//!
//! ## Example
//!
//! ```ignore
//! use didi_scan_client::{HttpTransport, JsonlQueue, ScanConfig, ScanPipeline, ValidationClient};
//!
//! let config = ScanConfig::default();
//! let client = Arc::new(ValidationClient::with_timeout(
//!     HttpTransport::new(config.transport())?,
//!     config.timeout(),
//! ));
//! let queue = Arc::new(JsonlQueue::open("scan-queue.jsonl").await?);
//!
//! let session = login(&client, "awa", "secret").await?;
//! let pipeline = ScanPipeline::new(client, queue, config.resolver());
//! let report = pipeline.process(&session, "DIDI-123").await?;
//! println!("{}", report.outcome.message);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod transport;
pub mod validation;

pub use config::{ConfigError, ScanConfig};
pub use coordinator::SyncCoordinator;
pub use error::{ClientError, DrainError};
pub use history::{compute_stats, history, stats};
pub use monitor::{ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, MonitorEvent};
pub use pipeline::{ScanPipeline, ScanReport, ScannerControl, ScannerMode, OFFLINE_MESSAGE};
pub use queue::{JsonlQueue, MemoryQueue, QueueError, QueueResult, ScanQueue};
pub use session::{login, SessionContext};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, HttpTransportConfig, Method, MockTransport, Transport,
    TransportError,
};
pub use validation::ValidationClient;
