//! Show session, authority and queue status.

use anyhow::Result;
use didi_scan_client::{ScanQueue, Transport};

use super::App;

/// Run the status command.
pub async fn run<T: Transport + 'static>(app: &App<T>) -> Result<()> {
    println!("didi-scan status");
    println!("================");
    println!();

    match app.sessions.load().await? {
        Some(session) => println!("Controller:  {}", session.controller_id),
        None => println!("Controller:  (not logged in)"),
    }

    let reachable = app.client.transport().probe().await;
    println!("Authority:   {}", app.config.authority.base_url);
    println!(
        "Reachable:   {}",
        if reachable { "yes" } else { "no (scans will be queued)" }
    );
    println!();

    println!("Pending:     {}", app.queue.count().await?);
    println!("Queue file:  {}", app.queue.path().display());
    println!("Data dir:    {}", app.data_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;

    #[tokio::test]
    async fn status_works_offline_and_logged_out() {
        let (app, transport, _dir) = testing::app().await;
        transport.set_offline(true);
        app.sessions.clear().await.unwrap();

        run(&app).await.unwrap();
        assert_eq!(transport.request_count(), 0);
    }
}
