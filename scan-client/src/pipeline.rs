//! Scan pipeline: from a decoded payload to a verdict or a queued scan.
//!
//! ```text
//! decode ─► resolve ─► (known offline?) ─► submit ─► Accepted | Rejected
//!                             │                 │
//!                             └─────────────────┴─► Unreachable ─► enqueue raw payload
//! ```
//!
//! [`ScanPipeline::run`] consumes a stream of decodes. Each accepted decode
//! is submitted in its own task, so pausing or stopping the scanner never
//! cancels a submission that already left. Results are streamed back as
//! they complete.

use didi_scan_core::{LifecycleEvent, Resolver, ScanState};
use didi_scan_types::{ScanAttempt, ScanId, Session, ValidationOutcome, ValidationStatus};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::error::ClientError;
use crate::queue::ScanQueue;
use crate::transport::Transport;
use crate::validation::ValidationClient;

/// Message shown for scans saved for later.
pub const OFFLINE_MESSAGE: &str = "Scan enregistré (mode hors ligne)";

/// Default window during which a repeated decode of the same payload is ignored.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Result of processing one decode.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// What was scanned.
    pub attempt: ScanAttempt,
    /// What the authority said (or the offline outcome).
    pub outcome: ValidationOutcome,
    /// Queue id when the scan was saved for later.
    pub queued_id: Option<ScanId>,
    /// Final lifecycle state.
    pub state: ScanState,
}

/// Scanner mode, driven by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerMode {
    /// Decodes are processed.
    Scanning,
    /// Decodes are discarded.
    Paused,
    /// The run ends once in-flight submissions finish.
    Stopped,
}

/// Host-side handle for pausing, resuming, and stopping a run.
#[derive(Debug, Clone)]
pub struct ScannerControl {
    tx: Arc<watch::Sender<ScannerMode>>,
}

impl ScannerControl {
    /// A control starting in [`ScannerMode::Scanning`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ScannerMode::Scanning);
        Self { tx: Arc::new(tx) }
    }

    /// Current mode.
    pub fn mode(&self) -> ScannerMode {
        *self.tx.borrow()
    }

    /// Discard decodes until resumed.
    pub fn pause(&self) {
        self.tx.send_replace(ScannerMode::Paused);
    }

    /// Process decodes again.
    pub fn resume(&self) {
        self.tx.send_replace(ScannerMode::Scanning);
    }

    /// End the run.
    pub fn stop(&self) {
        self.tx.send_replace(ScannerMode::Stopped);
    }

    fn subscribe(&self) -> watch::Receiver<ScannerMode> {
        self.tx.subscribe()
    }
}

impl Default for ScannerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Suppresses the same payload decoded again within a window.
#[derive(Debug)]
struct Cooldown {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Cooldown {
    fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Whether `payload` should be processed now.
    fn admit(&mut self, payload: &str, now: Instant) -> bool {
        if let Some((last, at)) = &self.last {
            if last == payload && now.duration_since(*at) < self.window {
                return false;
            }
        }
        self.last = Some((payload.to_string(), now));
        true
    }
}

/// Processes decodes: submit live, queue when unreachable.
pub struct ScanPipeline<T: Transport, Q: ScanQueue> {
    client: Arc<ValidationClient<T>>,
    queue: Arc<Q>,
    resolver: Resolver,
    connectivity: Option<watch::Receiver<bool>>,
    cooldown: Duration,
}

impl<T, Q> ScanPipeline<T, Q>
where
    T: Transport + 'static,
    Q: ScanQueue + 'static,
{
    /// Create a pipeline.
    pub fn new(client: Arc<ValidationClient<T>>, queue: Arc<Q>, resolver: Resolver) -> Self {
        Self {
            client,
            queue,
            resolver,
            connectivity: None,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Skip the network while this signal says offline.
    pub fn with_connectivity(mut self, signal: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(signal);
        self
    }

    /// Set the repeated-decode window.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    fn known_offline(&self) -> bool {
        self.connectivity
            .as_ref()
            .is_some_and(|signal| !*signal.borrow())
    }

    /// Process one decoded payload.
    ///
    /// Unreachable scans are queued with their raw payload. An expired
    /// session is returned as an error and nothing is queued.
    pub async fn process(&self, session: &Session, raw: &str) -> Result<ScanReport, ClientError> {
        let attempt = ScanAttempt::new(raw, self.resolver.resolve_text(raw));
        let mut state = ScanState::new();

        let outcome = if self.known_offline() {
            debug!(ticket = %attempt.resolved_ticket_id, "offline; skipping network");
            ValidationOutcome::unreachable(OFFLINE_MESSAGE)
        } else {
            state = state.on_event(LifecycleEvent::SubmitStarted);
            self.client
                .submit(session, &attempt.resolved_ticket_id)
                .await?
        };

        let (outcome, queued_id) = if outcome.status == ValidationStatus::Unreachable {
            let id = self.queue.enqueue(raw, &session.controller_id).await?;
            info!(id = %id, ticket = %attempt.resolved_ticket_id, "scan saved for later");
            (ValidationOutcome::unreachable(OFFLINE_MESSAGE), Some(id))
        } else {
            (outcome, None)
        };

        let state = state.on_event(LifecycleEvent::from_outcome(&outcome));
        Ok(ScanReport {
            attempt,
            outcome,
            queued_id,
            state,
        })
    }

    /// Process a stream of decodes until it ends, `control` stops it, or the
    /// authority refuses the session.
    ///
    /// Each result is sent on `reports` as soon as its submission completes.
    /// After an expired session no further decode is accepted; submissions
    /// already in flight still finish and are reported.
    pub async fn run<S>(
        self: Arc<Self>,
        session: Session,
        decodes: S,
        control: &ScannerControl,
        reports: mpsc::UnboundedSender<Result<ScanReport, ClientError>>,
    ) where
        S: Stream<Item = String> + Send,
    {
        let mut mode = control.subscribe();
        let mut cooldown = Cooldown::new(self.cooldown);
        let mut tasks = JoinSet::new();
        futures_util::pin_mut!(decodes);

        loop {
            if *mode.borrow_and_update() == ScannerMode::Stopped {
                break;
            }

            tokio::select! {
                biased;
                changed = mode.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if forward(joined, &reports) {
                        warn!("session expired; scanner stopped");
                        break;
                    }
                }
                next = decodes.next() => {
                    let Some(text) = next else { break };
                    if *mode.borrow() != ScannerMode::Scanning {
                        trace!("scanner paused; decode dropped");
                        continue;
                    }
                    if text.trim().is_empty() || !cooldown.admit(&text, Instant::now()) {
                        trace!("decode ignored");
                        continue;
                    }

                    let pipeline = Arc::clone(&self);
                    let session = session.clone();
                    tasks.spawn(async move { pipeline.process(&session, &text).await });
                }
            }
        }

        debug!(in_flight = tasks.len(), "scanner stopped; finishing submissions");
        while let Some(joined) = tasks.join_next().await {
            forward(joined, &reports);
        }
    }
}

/// Send one finished submission to the host. Returns whether the session expired.
fn forward(
    joined: Result<Result<ScanReport, ClientError>, JoinError>,
    reports: &mpsc::UnboundedSender<Result<ScanReport, ClientError>>,
) -> bool {
    match joined {
        Ok(result) => {
            let expired = matches!(result, Err(ClientError::AuthExpired));
            if reports.send(result).is_err() {
                trace!("report receiver dropped");
            }
            expired
        }
        Err(e) => {
            warn!(error = %e, "scan task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::transport::MockTransport;
    use didi_scan_types::{ControllerId, Credential, FailureReason, TicketId};
    use futures_util::stream;
    use serde_json::json;

    type Pipeline = ScanPipeline<MockTransport, MemoryQueue>;

    fn session() -> Session {
        Session::new(ControllerId::new("awa"), Credential::new("tok"))
    }

    fn setup() -> (Pipeline, MockTransport, Arc<MemoryQueue>) {
        let transport = MockTransport::new();
        let queue = Arc::new(MemoryQueue::new());
        let client = Arc::new(ValidationClient::new(transport.clone()));
        (
            Pipeline::new(client, Arc::clone(&queue), Resolver::default()),
            transport,
            queue,
        )
    }

    fn accepted() -> serde_json::Value {
        json!({ "success": true, "data": { "success": true } })
    }

    fn channel_stream(rx: mpsc::UnboundedReceiver<String>) -> impl Stream<Item = String> {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) })
    }

    /// Run to completion and collect every report.
    async fn run_collect<S>(
        pipeline: Pipeline,
        decodes: S,
        control: &ScannerControl,
    ) -> Vec<Result<ScanReport, ClientError>>
    where
        S: Stream<Item = String> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Arc::new(pipeline).run(session(), decodes, control, tx).await;
        let mut reports = Vec::new();
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        reports
    }

    // ===========================================
    // process() Tests
    // ===========================================

    #[tokio::test]
    async fn online_accept() {
        let (pipeline, transport, queue) = setup();
        transport.queue_response(200, accepted());

        let report = pipeline.process(&session(), "DIDI-123").await.unwrap();

        assert_eq!(report.attempt.resolved_ticket_id, TicketId::new("DIDI-123"));
        assert_eq!(report.outcome.status, ValidationStatus::Accepted);
        assert_eq!(report.state, ScanState::Accepted);
        assert_eq!(report.queued_id, None);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn online_reject_is_not_queued() {
        let (pipeline, transport, queue) = setup();
        transport.queue_response(404, json!({ "success": false, "error": "Ticket not found" }));

        let report = pipeline.process(&session(), "DIDI-404").await.unwrap();

        assert_eq!(
            report.state,
            ScanState::Rejected {
                reason: FailureReason::NotFound
            }
        );
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_queues_raw_payload() {
        let (pipeline, transport, queue) = setup();
        transport.set_offline(true);
        let raw = r#"{"ticketId":"DIDI-9","seat":"B2"}"#;

        let report = pipeline.process(&session(), raw).await.unwrap();

        assert_eq!(report.attempt.resolved_ticket_id, TicketId::new("DIDI-9"));
        assert_eq!(report.outcome.status, ValidationStatus::Unreachable);
        assert_eq!(report.outcome.message, OFFLINE_MESSAGE);
        assert_eq!(report.state, ScanState::Queued { attempts: 0 });

        let queued = queue.list().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(Some(queued[0].id), report.queued_id);
        assert_eq!(queued[0].ticket_raw_payload, raw);
        assert_eq!(queued[0].controller_id, ControllerId::new("awa"));
    }

    #[tokio::test]
    async fn known_offline_skips_network() {
        let (pipeline, transport, queue) = setup();
        let (_tx, signal) = watch::channel(false);
        let pipeline = pipeline.with_connectivity(signal);

        let report = pipeline.process(&session(), "DIDI-1").await.unwrap();

        assert_eq!(transport.request_count(), 0);
        assert!(report.queued_id.is_some());
        assert_eq!(queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn auth_expired_is_surfaced_not_queued() {
        let (pipeline, transport, queue) = setup();
        transport.queue_response(401, json!({ "success": false }));

        let result = pipeline.process(&session(), "DIDI-1").await;

        assert!(matches!(result, Err(ClientError::AuthExpired)));
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn queued_scan_leaves_queue_after_replay() {
        use crate::coordinator::SyncCoordinator;

        let (pipeline, transport, queue) = setup();
        transport.set_offline(true);
        pipeline.process(&session(), "DIDI-77").await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);

        transport.set_offline(false);
        transport.queue_response(200, accepted());
        let coordinator = SyncCoordinator::new(
            Arc::clone(&pipeline.client),
            Arc::clone(&queue),
            Resolver::default(),
        );
        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    // ===========================================
    // run() Tests
    // ===========================================

    #[tokio::test]
    async fn run_processes_stream_until_end() {
        let (pipeline, transport, _queue) = setup();
        transport.respond_to("/tickets/DIDI-1/scan", 200, accepted());
        transport.respond_to("/tickets/DIDI-2/scan", 200, accepted());
        let control = ScannerControl::new();

        let decodes = stream::iter(vec!["DIDI-1".to_string(), "  ".into(), "DIDI-2".into()]);
        let reports = run_collect(pipeline, decodes, &control).await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.as_ref().unwrap().outcome.is_accepted()));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeated_decodes() {
        let (pipeline, transport, _queue) = setup();
        transport.respond_to("/tickets/DIDI-1/scan", 200, accepted());
        transport.respond_to("/tickets/DIDI-2/scan", 200, accepted());
        let control = ScannerControl::new();

        let decodes = stream::iter(
            ["DIDI-1", "DIDI-1", "DIDI-1", "DIDI-2"].map(String::from),
        );
        let reports = run_collect(pipeline, decodes, &control).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn cooldown_window_expires() {
        let mut cooldown = Cooldown::new(Duration::from_secs(3));
        let start = Instant::now();

        assert!(cooldown.admit("DIDI-1", start));
        assert!(!cooldown.admit("DIDI-1", start + Duration::from_secs(1)));
        assert!(cooldown.admit("DIDI-2", start + Duration::from_secs(1)));
        assert!(cooldown.admit("DIDI-1", start + Duration::from_secs(2)));
        assert!(cooldown.admit("DIDI-1", start + Duration::from_secs(6)));
    }

    #[tokio::test]
    async fn paused_scanner_drops_decodes() {
        let (pipeline, transport, _queue) = setup();
        transport.respond_to("/tickets/DIDI-2/scan", 200, accepted());
        let control = ScannerControl::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let run = {
            let control = control.clone();
            tokio::spawn(async move { run_collect(pipeline, channel_stream(rx), &control).await })
        };

        control.pause();
        tx.send("DIDI-1".to_string()).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        control.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send("DIDI-2".to_string()).unwrap();
        drop(tx);

        let reports = run.await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].as_ref().unwrap().attempt.raw_payload,
            "DIDI-2"
        );
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_submission() {
        let (pipeline, transport, _queue) = setup();
        transport.set_delay(Some(Duration::from_millis(50)));
        transport.queue_response(200, accepted());
        let control = ScannerControl::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let run = {
            let control = control.clone();
            tokio::spawn(async move { run_collect(pipeline, channel_stream(rx), &control).await })
        };

        tx.send("DIDI-1".to_string()).unwrap();
        while transport.request_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        control.stop();

        let reports = run.await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].as_ref().unwrap().outcome.is_accepted());
        // The sender is still alive: the run ended because of stop().
        drop(tx);
    }

    #[tokio::test]
    async fn reports_arrive_while_stream_is_open() {
        let (pipeline, transport, _queue) = setup();
        transport.queue_response(200, accepted());
        let control = ScannerControl::new();
        let (decode_tx, decode_rx) = mpsc::unbounded_channel();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();

        let run = {
            let control = control.clone();
            tokio::spawn(async move {
                Arc::new(pipeline)
                    .run(session(), channel_stream(decode_rx), &control, report_tx)
                    .await
            })
        };

        decode_tx.send("DIDI-1".to_string()).unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), report_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.unwrap().outcome.is_accepted());
        assert!(!run.is_finished());

        control.stop();
        run.await.unwrap();
        drop(decode_tx);
    }

    #[tokio::test]
    async fn expired_session_ends_run() {
        let (pipeline, transport, queue) = setup();
        transport.set_delay(Some(Duration::from_millis(10)));
        transport.queue_response(401, json!({ "success": false }));
        transport.queue_response(401, json!({ "success": false }));
        let control = ScannerControl::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let run = {
            let control = control.clone();
            tokio::spawn(async move { run_collect(pipeline, channel_stream(rx), &control).await })
        };

        tx.send("DIDI-1".to_string()).unwrap();
        let reports = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap();
        // The run ended on its own; later decodes go nowhere.
        assert!(tx.send("DIDI-2".to_string()).is_err());

        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], Err(ClientError::AuthExpired)));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(queue.count().await.unwrap(), 0);
    }
}
