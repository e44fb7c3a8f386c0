//! Stay in the foreground and sync whenever the authority comes back.

use anyhow::Result;
use didi_scan_client::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, MonitorEvent, ScanQueue,
    SessionContext, Transport,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::App;

/// Run the watch command until Ctrl+C.
pub async fn run<T: Transport + Clone + 'static>(app: &App<T>) -> Result<()> {
    watch_until(app, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Watch connectivity until `shutdown` resolves or the session expires.
pub async fn watch_until<T, F>(app: &App<T>, shutdown: F) -> Result<()>
where
    T: Transport + Clone + 'static,
    F: Future<Output = ()>,
{
    let session = app.session().await?;
    let sessions = SessionContext::with_session(session);

    let probe = ConnectivityProbe::new(app.client.transport().clone(), app.config.probe_interval());
    let (signal, probe_task) = probe.start().await;

    let monitor = ConnectivityMonitor::new(Arc::new(app.coordinator()), sessions.clone())
        .with_settle(app.config.settle());
    let mut events = monitor.subscribe();
    let monitor_task = tokio::spawn(monitor.run(signal));

    println!(
        "Watching {} ({} pending). Press Ctrl+C to stop.",
        app.config.authority.base_url,
        app.queue.count().await?
    );

    tokio::pin!(shutdown);
    let mut expired = false;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(MonitorEvent::AuthExpired) => {
                    sessions.clear().await;
                    expired = true;
                    break;
                }
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed monitor events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Dropping the probe closes the signal, which ends the monitor.
    probe_task.abort();
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "monitor task failed");
    }
    info!("watch stopped");

    if expired {
        return Err(app.session_expired().await);
    }
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Connectivity(ConnectivityEvent::Online) => println!("online"),
        MonitorEvent::Connectivity(ConnectivityEvent::Offline) => {
            println!("offline: scans will be queued")
        }
        MonitorEvent::Drained(report) => {
            println!("synced {}, failed {}", report.synced, report.failed)
        }
        MonitorEvent::DrainFailed(message) => println!("sync failed: {}", message),
        MonitorEvent::NoSession => println!("online, but not logged in"),
        MonitorEvent::AuthExpired => println!("session expired"),
    }
}
