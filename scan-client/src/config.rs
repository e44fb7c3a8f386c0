//! Configuration loading for didi-scan.
//!
//! Configuration is loaded from a TOML file (default: `didi-scan.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use didi_scan_core::{Resolver, RetryPolicy};

use crate::transport::HttpTransportConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Ticket authority.
    pub authority: AuthorityConfig,
    /// Offline queue.
    pub queue: QueueConfig,
    /// Scanner behavior.
    pub scanner: ScannerConfig,
    /// Sync behavior.
    pub sync: SyncConfig,
}

/// Ticket authority configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// API base URL (default: http://localhost:5555/api).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Offline queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Queue file. Relative paths are resolved against the data directory.
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
}

/// Scanner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Prefix of bare ticket ids (default: "DIDI-").
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,
    /// Ignore the same payload decoded again within this many ms (default: 3000).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

/// Sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Park items after this many failed replays; 0 retries forever (default: 0).
    #[serde(default)]
    pub max_attempts: u32,
    /// Wait this long after reconnecting before draining (default: 0).
    #[serde(default)]
    pub settle_ms: u64,
    /// Reachability probe interval in seconds (default: 15).
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:5555/api".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("scan-queue.jsonl")
}

fn default_ticket_prefix() -> String {
    didi_scan_core::DEFAULT_TICKET_PREFIX.to_string()
}

fn default_cooldown_ms() -> u64 {
    3000
}

fn default_probe_interval_secs() -> u64 {
    15
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ticket_prefix: default_ticket_prefix(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            settle_ms: 0,
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Settings for the HTTP transport.
    pub fn transport(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.authority.base_url.clone(),
            timeout: self.timeout(),
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.authority.timeout_secs)
    }

    /// Queue file, resolved against `data_dir` when relative.
    pub fn queue_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.queue.path)
    }

    /// Ticket id resolver.
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.scanner.ticket_prefix.as_str())
    }

    /// Repeated-decode window.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.scanner.cooldown_ms)
    }

    /// Drain retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_limit(self.sync.max_attempts)
    }

    /// Delay between reconnecting and draining.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.sync.settle_ms)
    }

    /// Reachability probe interval.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.sync.probe_interval_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
