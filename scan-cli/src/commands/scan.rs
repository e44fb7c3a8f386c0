//! Scan tickets: one payload, or one per line on stdin.

use anyhow::{Context, Result};
use didi_scan_client::{ClientError, ScanPipeline, ScanReport, ScannerControl, Transport};
use didi_scan_types::ValidationStatus;
use futures_util::stream;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use super::App;

/// Run the scan command.
pub async fn run<T: Transport + 'static>(
    app: &App<T>,
    payload: Option<String>,
    from_stdin: bool,
) -> Result<()> {
    let session = app.session().await?;
    let pipeline = ScanPipeline::new(
        Arc::clone(&app.client),
        Arc::clone(&app.queue),
        app.config.resolver(),
    )
    .with_cooldown(app.config.cooldown());

    if !from_stdin {
        let payload = payload.context("Provide a payload, or --stdin to read one per line")?;
        return match pipeline.process(&session, &payload).await {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(e) => Err(app.fail(e).await),
        };
    }

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let decodes = stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                None
            }
        }
    });

    let control = ScannerControl::new();
    let stopper = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                control.stop();
            }
        })
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = async {
        let mut expired = false;
        while let Some(result) = rx.recv().await {
            match result {
                Ok(report) => print_report(&report),
                Err(ClientError::AuthExpired) => expired = true,
                Err(e) => eprintln!("error: {}", e),
            }
        }
        expired
    };
    let ((), expired) = tokio::join!(
        Arc::new(pipeline).run(session, decodes, &control, tx),
        printer
    );
    stopper.abort();

    if expired {
        return Err(app.session_expired().await);
    }
    Ok(())
}

/// One line per scan, plus the holder when the authority named one.
pub fn print_report(report: &ScanReport) {
    let ticket = &report.attempt.resolved_ticket_id;
    let outcome = &report.outcome;

    match outcome.status {
        ValidationStatus::Accepted => println!("VALID    {}  {}", ticket, outcome.message),
        ValidationStatus::Rejected => match outcome.reason {
            Some(reason) => println!("INVALID  {}  {} ({})", ticket, outcome.message, reason),
            None => println!("INVALID  {}  {}", ticket, outcome.message),
        },
        ValidationStatus::Unreachable => println!("QUEUED   {}  {}", ticket, outcome.message),
    }

    if let Some(name) = outcome
        .ticket_summary
        .as_ref()
        .and_then(|s| s.customer_name.as_deref())
    {
        println!("         {}", name);
    }
}
