//! Show the offline queue.

use anyhow::Result;
use didi_scan_client::{ScanQueue, Transport};

use super::App;

/// Run the queue command.
pub async fn run<T: Transport + 'static>(app: &App<T>) -> Result<()> {
    let scans = app.queue.list().await?;
    if scans.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{} scan(s) waiting to sync:", scans.len());
    println!();
    let resolver = app.config.resolver();
    for scan in &scans {
        println!(
            "  {}  {}  {:<16}  attempts: {}  by {}",
            &scan.id.to_string()[..8],
            scan.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            resolver.resolve_text(&scan.ticket_raw_payload),
            scan.attempts,
            scan.controller_id,
        );
    }
    Ok(())
}
