//! CLI command implementations.

pub mod history;
pub mod login;
pub mod queue;
pub mod scan;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};
use didi_scan_client::{
    ClientError, HttpTransport, JsonlQueue, ScanConfig, SyncCoordinator, Transport,
    ValidationClient,
};
use didi_scan_types::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SessionStore;

/// Everything a command needs: config, authority client, queue, session file.
pub struct App<T: Transport> {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Loaded configuration.
    pub config: ScanConfig,
    /// Authority client.
    pub client: Arc<ValidationClient<T>>,
    /// Offline queue.
    pub queue: Arc<JsonlQueue>,
    /// Stored session.
    pub sessions: SessionStore,
}

impl App<HttpTransport> {
    /// Open the app with the HTTP transport described by `config`.
    pub async fn open(data_dir: &Path, config: ScanConfig) -> Result<Self> {
        let transport =
            HttpTransport::new(config.transport()).context("Invalid authority configuration")?;
        Self::with_transport(data_dir, config, transport).await
    }
}

impl<T: Transport + 'static> App<T> {
    /// Open the app over any transport.
    pub async fn with_transport(data_dir: &Path, config: ScanConfig, transport: T) -> Result<Self> {
        let queue_path = config.queue_path(data_dir);
        let queue = JsonlQueue::open(&queue_path)
            .await
            .with_context(|| format!("Failed to open queue {}", queue_path.display()))?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            client: Arc::new(ValidationClient::with_timeout(transport, config.timeout())),
            queue: Arc::new(queue),
            sessions: SessionStore::new(data_dir),
            config,
        })
    }

    /// The stored session, or an error telling the operator to log in.
    pub async fn session(&self) -> Result<Session> {
        self.sessions.require().await
    }

    /// A sync coordinator over this app's client and queue.
    pub fn coordinator(&self) -> SyncCoordinator<T, JsonlQueue> {
        SyncCoordinator::new(
            Arc::clone(&self.client),
            Arc::clone(&self.queue),
            self.config.resolver(),
        )
        .with_policy(self.config.retry_policy())
    }

    /// Map a client error, dropping the stored session when it expired.
    pub async fn fail(&self, error: ClientError) -> anyhow::Error {
        if matches!(error, ClientError::AuthExpired) {
            return self.session_expired().await;
        }
        anyhow::Error::new(error)
    }

    /// Drop the stored session and return the error to show.
    pub async fn session_expired(&self) -> anyhow::Error {
        if let Err(e) = self.sessions.clear().await {
            return e.context("Session expired");
        }
        anyhow::anyhow!("Session expired. Run 'didi-scan login' again.")
    }
}
