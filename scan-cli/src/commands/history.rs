//! Scan history and controller statistics.

use anyhow::Result;
use didi_scan_client::{history, stats, Transport};

use super::App;

/// Run the history command.
pub async fn run<T: Transport + 'static>(app: &App<T>, limit: u32) -> Result<()> {
    let session = app.session().await?;
    let resolver = app.config.resolver();
    let entries = match history(&app.client, app.queue.as_ref(), &resolver, &session, limit)
        .await
    {
        Ok(entries) => entries,
        Err(e) => return Err(app.fail(e).await),
    };

    if entries.is_empty() {
        println!("No scans yet.");
        return Ok(());
    }

    for entry in &entries {
        let status = match (entry.offline, entry.valid) {
            (true, _) => "QUEUED ",
            (false, true) => "VALID  ",
            (false, false) => "INVALID",
        };
        let name = entry
            .ticket
            .as_ref()
            .and_then(|t| t.customer_name.as_deref())
            .unwrap_or("");
        println!(
            "{}  {}  {:<16}  {}",
            status,
            entry.timestamp.as_deref().unwrap_or("-"),
            entry.ticket_code,
            name
        );
    }
    Ok(())
}

/// Run the stats command.
pub async fn stats_command<T: Transport + 'static>(app: &App<T>) -> Result<()> {
    let session = app.session().await?;
    let stats = match stats(&app.client, app.queue.as_ref(), &session).await {
        Ok(stats) => stats,
        Err(e) => return Err(app.fail(e).await),
    };

    println!("Scans for {}", session.controller_id);
    if stats.offline {
        println!("(authority unreachable; remote counts unavailable)");
    }
    println!("  Today:    {}", stats.today_scans);
    println!("  Total:    {}", stats.total_scans);
    println!("  Valid:    {}", stats.valid_scans);
    println!("  Invalid:  {}", stats.invalid_scans);
    println!("  Pending:  {}", stats.pending);
    Ok(())
}
