//! Local state for didi-scan: config file lookup and the stored session.

use anyhow::{Context, Result};
use didi_scan_client::ScanConfig;
use didi_scan_types::Session;
use std::path::{Path, PathBuf};

/// Config file looked up in the data directory when `--config` is absent.
pub const CONFIG_FILE: &str = "didi-scan.toml";

/// Session file in the data directory.
pub const SESSION_FILE: &str = "session.json";

/// Load the configuration.
///
/// An explicit path must exist. Otherwise `didi-scan.toml` in the data
/// directory is used when present, and defaults when not.
pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<ScanConfig> {
    if let Some(path) = explicit {
        return ScanConfig::from_file(path).context("Invalid configuration");
    }

    let path = data_dir.join(CONFIG_FILE);
    if path.exists() {
        ScanConfig::from_file(&path).context("Invalid configuration")
    } else {
        Ok(ScanConfig::default())
    }
}

/// The logged-in session, persisted between invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store in `data_dir/session.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    /// Path to the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session, if any.
    pub async fn load(&self) -> Result<Option<Session>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let session = serde_json::from_str(&contents).context("Invalid session file")?;
                Ok(Some(session))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read session file"),
        }
    }

    /// Load the stored session or fail with a hint to log in.
    pub async fn require(&self) -> Result<Session> {
        self.load()
            .await?
            .context("Not logged in. Run 'didi-scan login' first.")
    }

    /// Save the session (owner-readable only).
    pub async fn save(&self, session: &Session) -> Result<()> {
        let contents = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, contents)
            .await
            .context("Failed to save session")?;
        set_file_permissions_0600(&self.path).await?;
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub async fn clear(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
