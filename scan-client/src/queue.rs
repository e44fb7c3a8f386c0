//! Offline queue for scans that could not reach the authority.
//!
//! Uses JSONL for durability: each scan is one line, appended and fsynced
//! before `enqueue` returns. Removals and attempt updates rewrite the file
//! through a temp file and an atomic rename, so a crash leaves either the
//! old or the new queue, never a torn one.
//!
//! Lines that fail to parse are skipped by [`ScanQueue::list`] with a
//! warning, and kept verbatim on every rewrite.

use async_trait::async_trait;
use didi_scan_types::{ControllerId, QueuedScan, RecordError, ScanId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] RecordError),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Durable FIFO of pending scans.
///
/// Implementations must keep insertion order and be safe to share between
/// the scan pipeline (enqueue) and the sync coordinator (list, remove).
#[async_trait]
pub trait ScanQueue: Send + Sync {
    /// Persist a new scan and return its fresh id.
    async fn enqueue(&self, raw_payload: &str, controller_id: &ControllerId) -> QueueResult<ScanId>;

    /// All readable records, oldest first.
    async fn list(&self) -> QueueResult<Vec<QueuedScan>>;

    /// Delete the record with this id. Absent ids are not an error.
    async fn remove_by_id(&self, id: &ScanId) -> QueueResult<()>;

    /// Overwrite the record with the same id. Absent ids are ignored.
    async fn replace(&self, scan: &QueuedScan) -> QueueResult<()>;

    /// Number of readable records.
    async fn count(&self) -> QueueResult<usize> {
        Ok(self.list().await?.len())
    }
}

/// JSONL-backed queue.
#[derive(Debug)]
pub struct JsonlQueue {
    /// Path to the queue file.
    path: PathBuf,
    /// Serializes every read-modify-write of the file.
    lock: Mutex<()>,
}

impl JsonlQueue {
    /// Create or open a queue at the given path.
    pub async fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Ensure the file exists (create if not)
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // A crash mid-append can leave a partial last line. Terminate it so
        // the next record starts on its own line.
        let content = fs::read(&path).await?;
        if content.last().is_some_and(|b| *b != b'\n') {
            warn!(path = %path.display(), "queue file ends with a partial line");
            file.write_all(b"\n").await?;
            file.sync_all().await?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path to the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> QueueResult<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the file, mapping each parsed record through `edit`.
    ///
    /// `edit` returns the replacement (`None` drops the record). Unparseable
    /// lines pass through untouched. Nothing is written if nothing changed.
    async fn rewrite<F>(&self, mut edit: F) -> QueueResult<()>
    where
        F: FnMut(&QueuedScan) -> Option<Option<QueuedScan>> + Send,
    {
        let _guard = self.lock.lock().await;
        let content = self.read_content().await?;

        let mut out = String::with_capacity(content.len());
        let mut changed = false;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let edited = match QueuedScan::from_json_line(line) {
                Ok(scan) => edit(&scan),
                Err(_) => None,
            };
            match edited {
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
                Some(None) => changed = true,
                Some(Some(scan)) => {
                    out.push_str(&scan.to_json_line()?);
                    out.push('\n');
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(());
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(out.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ScanQueue for JsonlQueue {
    async fn enqueue(&self, raw_payload: &str, controller_id: &ControllerId) -> QueueResult<ScanId> {
        let scan = QueuedScan::new(raw_payload, controller_id.clone());
        let mut line = scan.to_json_line()?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;

        debug!(id = %scan.id, "scan queued");
        Ok(scan.id)
    }

    async fn list(&self) -> QueueResult<Vec<QueuedScan>> {
        let content = {
            let _guard = self.lock.lock().await;
            self.read_content().await?
        };

        let mut scans = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match QueuedScan::from_json_line(line) {
                Ok(scan) => scans.push(scan),
                Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable queue record"),
            }
        }
        Ok(scans)
    }

    async fn remove_by_id(&self, id: &ScanId) -> QueueResult<()> {
        let id = *id;
        self.rewrite(|scan| (scan.id == id).then_some(None)).await
    }

    async fn replace(&self, scan: &QueuedScan) -> QueueResult<()> {
        self.rewrite(|existing| {
            (existing.id == scan.id).then(|| Some(scan.clone()))
        })
        .await
    }
}

/// In-process queue. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    scans: Mutex<Vec<QueuedScan>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prepared record as-is (for seeding tests).
    pub async fn push(&self, scan: QueuedScan) {
        self.scans.lock().await.push(scan);
    }
}

#[async_trait]
impl ScanQueue for MemoryQueue {
    async fn enqueue(&self, raw_payload: &str, controller_id: &ControllerId) -> QueueResult<ScanId> {
        let scan = QueuedScan::new(raw_payload, controller_id.clone());
        let id = scan.id;
        self.scans.lock().await.push(scan);
        Ok(id)
    }

    async fn list(&self) -> QueueResult<Vec<QueuedScan>> {
        Ok(self.scans.lock().await.clone())
    }

    async fn remove_by_id(&self, id: &ScanId) -> QueueResult<()> {
        self.scans.lock().await.retain(|scan| scan.id != *id);
        Ok(())
    }

    async fn replace(&self, scan: &QueuedScan) -> QueueResult<()> {
        let mut scans = self.scans.lock().await;
        if let Some(existing) = scans.iter_mut().find(|s| s.id == scan.id) {
            *existing = scan.clone();
        }
        Ok(())
    }
}
