//! Replay the offline queue now.

use anyhow::Result;
use didi_scan_client::{DrainError, ScanQueue, Transport};

use super::App;

/// Run the sync command.
pub async fn run<T: Transport + 'static>(app: &App<T>) -> Result<()> {
    let session = app.session().await?;
    let pending = app.queue.count().await?;
    if pending == 0 {
        println!("Nothing to sync.");
        return Ok(());
    }

    println!("Syncing {} scan(s)...", pending);
    let report = match app.coordinator().drain(&session).await {
        Ok(report) => report,
        Err(DrainError::AuthExpired) => return Err(app.session_expired().await),
        Err(e) => return Err(e.into()),
    };

    let remaining = app.queue.count().await?;
    println!("  Synced:    {}", report.synced);
    println!("  Failed:    {}", report.failed);
    println!("  Remaining: {}", remaining);
    if report.failed > 0 {
        println!();
        println!("The ticket server is unreachable; try again later.");
    }
    Ok(())
}
