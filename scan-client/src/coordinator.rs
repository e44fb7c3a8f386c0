//! Sync coordinator: replays the offline queue against the authority.
//!
//! A drain snapshots the queue once and replays it oldest first, one item at
//! a time, through the same [`ValidationClient`] used for live scans. What
//! happens to each item is decided by [`didi_scan_core::decide`].
//!
//! # Single flight
//!
//! At most one drain runs at a time. A [`SyncCoordinator::drain`] issued
//! while another is running waits for it and returns its report instead of
//! starting a second pass over the same items. The rule is enforced with a
//! lock and a generation counter:
//!
//! 1. read the generation, then take the lock;
//! 2. if the generation moved while waiting, a drain completed that started
//!    after this call began: return its report;
//! 3. otherwise run a drain and bump the generation before releasing.
//!
//! A joined drain that stopped on an unreachable item does not settle the
//! call: the first waiter behind it runs one follow-up drain, since the
//! trigger that woke it may have arrived after the failed replay. Later
//! waiters see the generation moved twice and return the follow-up's report.
//!
//! [`SyncCoordinator::try_drain`] skips the wait and returns `None` when busy.

use didi_scan_core::{
    decide, DrainDecision, DrainTally, LifecycleEvent, ReplayResult, Resolver, RetryPolicy,
    ScanState,
};
use didi_scan_types::{DrainReport, QueuedScan, Session};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{ClientError, DrainError};
use crate::queue::ScanQueue;
use crate::transport::Transport;
use crate::validation::ValidationClient;

/// Replays queued scans. Share it behind an `Arc`.
pub struct SyncCoordinator<T: Transport, Q: ScanQueue> {
    client: Arc<ValidationClient<T>>,
    queue: Arc<Q>,
    resolver: Resolver,
    policy: RetryPolicy,
    /// Report of the last successful drain; the lock is the single-flight gate.
    last: Mutex<Option<DrainReport>>,
    generation: AtomicU64,
}

impl<T: Transport, Q: ScanQueue> SyncCoordinator<T, Q> {
    /// Create a coordinator with unbounded retries.
    pub fn new(client: Arc<ValidationClient<T>>, queue: Arc<Q>, resolver: Resolver) -> Self {
        Self {
            client,
            queue,
            resolver,
            policy: RetryPolicy::unbounded(),
            last: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Use a retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The queue being drained.
    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    /// Number of completed drains.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a drain is running right now.
    pub fn is_draining(&self) -> bool {
        self.last.try_lock().is_err()
    }

    /// Drain the queue, or join the drain already in flight.
    pub async fn drain(&self, session: &Session) -> Result<DrainReport, DrainError> {
        let observed = self.generation.load(Ordering::Acquire);
        let guard = self.last.lock().await;

        let completed = self.generation.load(Ordering::Acquire).wrapping_sub(observed);
        if completed > 0 {
            match *guard {
                // A drain that stopped on an unreachable item may have run
                // before this trigger's connectivity; the first joiner reruns.
                Some(report) if report.failed > 0 && completed == 1 => {
                    debug!("joined drain stopped early; running follow-up");
                }
                Some(report) => {
                    debug!("joined in-flight drain");
                    return Ok(report);
                }
                // The drain we waited on failed; run our own.
                None => {}
            }
        }

        self.run_locked(guard, session).await
    }

    /// Drain the queue unless a drain is already running.
    pub async fn try_drain(&self, session: &Session) -> Result<Option<DrainReport>, DrainError> {
        match self.last.try_lock() {
            Ok(guard) => self.run_locked(guard, session).await.map(Some),
            Err(_) => {
                debug!("drain already in flight");
                Ok(None)
            }
        }
    }

    async fn run_locked(
        &self,
        mut guard: MutexGuard<'_, Option<DrainReport>>,
        session: &Session,
    ) -> Result<DrainReport, DrainError> {
        let result = self.replay_all(session).await;
        *guard = result.as_ref().ok().copied();
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn replay_all(&self, session: &Session) -> Result<DrainReport, DrainError> {
        let span = info_span!("drain", controller = %session.controller_id);
        async move {
            let snapshot = self.queue.list().await?;
            if snapshot.is_empty() {
                debug!("queue empty");
                return Ok(DrainReport::default());
            }
            info!(pending = snapshot.len(), "draining offline queue");

            let mut tally = DrainTally::new();
            for scan in snapshot {
                if !self.policy.should_attempt(&scan) {
                    debug!(id = %scan.id, attempts = scan.attempts, "over retry limit; parked");
                    tally.skip();
                    continue;
                }

                let decision = self.replay_one(session, &scan).await?;
                tally.apply(decision);
                if !decision.continues() {
                    break;
                }
            }

            let removed = tally.removed();
            let skipped = tally.skipped();
            let report = tally.finish();
            info!(
                synced = report.synced,
                failed = report.failed,
                removed,
                skipped,
                "drain finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn replay_one(
        &self,
        session: &Session,
        scan: &QueuedScan,
    ) -> Result<DrainDecision, DrainError> {
        let state = ScanState::for_queued(scan).on_event(LifecycleEvent::ReplayStarted);
        let ticket_id = self.resolver.resolve_text(&scan.ticket_raw_payload);

        let (result, state) = match self.client.submit(session, &ticket_id).await {
            Ok(outcome) => (
                ReplayResult::Outcome(outcome.status),
                state.on_event(LifecycleEvent::from_outcome(&outcome)),
            ),
            Err(ClientError::AuthExpired) => (ReplayResult::AuthExpired, state),
            Err(e) => return Err(e.into()),
        };

        let decision = decide(result);
        match decision {
            DrainDecision::Remove { .. } => self.queue.remove_by_id(&scan.id).await?,
            DrainDecision::RetainAndStop => {
                warn!(id = %scan.id, ticket = %ticket_id, "replay unreachable; stopping drain");
                self.queue.replace(&scan.with_failed_attempt()).await?;
            }
            DrainDecision::Abort => {
                warn!(id = %scan.id, "session expired during drain");
                return Err(DrainError::AuthExpired);
            }
        }

        debug!(id = %scan.id, ticket = %ticket_id, ?state, "replayed");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JsonlQueue, MemoryQueue};
    use crate::transport::{MockTransport, TransportError};
    use didi_scan_types::{ControllerId, Credential};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(ControllerId::new("awa"), Credential::new("tok"))
    }

    fn accepted() -> serde_json::Value {
        json!({ "success": true, "data": { "success": true, "message": "Billet valide" } })
    }

    fn already_used() -> serde_json::Value {
        json!({ "success": false, "data": { "success": false, "message": "Billet déjà utilisé" } })
    }

    fn coordinator<Q: ScanQueue>(queue: Arc<Q>) -> (SyncCoordinator<MockTransport, Q>, MockTransport) {
        let transport = MockTransport::new();
        let client = Arc::new(ValidationClient::new(transport.clone()));
        (
            SyncCoordinator::new(client, queue, Resolver::default()),
            transport,
        )
    }

    async fn seeded(payloads: &[&str]) -> Arc<MemoryQueue> {
        let queue = Arc::new(MemoryQueue::new());
        for payload in payloads {
            queue.enqueue(payload, &ControllerId::new("awa")).await.unwrap();
        }
        queue
    }

    fn submitted_paths(transport: &MockTransport) -> Vec<String> {
        transport.sent_requests().iter().map(|r| r.path()).collect()
    }

    // ===========================================
    // Drain Rule Tests
    // ===========================================

    #[tokio::test]
    async fn drain_replays_in_fifo_order() {
        let queue = seeded(&["DIDI-1", "DIDI-2", "DIDI-3"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        for _ in 0..3 {
            transport.queue_response(200, accepted());
        }

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 3, failed: 0 });
        assert_eq!(
            submitted_paths(&transport),
            vec![
                "/tickets/DIDI-1/scan",
                "/tickets/DIDI-2/scan",
                "/tickets/DIDI-3/scan"
            ]
        );
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_queue_sends_nothing() {
        let queue = seeded(&[]).await;
        let (coordinator, transport) = coordinator(queue);

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport::default());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn rejected_items_are_removed_but_not_counted() {
        let queue = seeded(&["DIDI-1", "DIDI-2"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(400, already_used());
        transport.queue_response(200, accepted());

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 1, failed: 0 });
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_stops_run_and_bumps_attempts() {
        let queue = seeded(&["DIDI-1", "DIDI-2", "DIDI-3"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(200, accepted());
        transport.queue_failure(TransportError::ConnectionFailed("refused".into()));
        transport.queue_response(200, accepted());

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 1, failed: 1 });
        assert_eq!(transport.request_count(), 2);

        let left = queue.list().await.unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].ticket_raw_payload, "DIDI-2");
        assert_eq!(left[0].attempts, 1);
        assert_eq!(left[1].ticket_raw_payload, "DIDI-3");
        assert_eq!(left[1].attempts, 0);
    }

    #[tokio::test]
    async fn auth_expired_aborts_without_removal() {
        let queue = seeded(&["DIDI-1", "DIDI-2"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(401, json!({ "success": false, "error": "Token expiré" }));

        let result = coordinator.drain(&session()).await;

        assert!(matches!(result, Err(DrainError::AuthExpired)));
        assert_eq!(transport.request_count(), 1);
        let left = queue.list().await.unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|s| s.attempts == 0));
    }

    #[tokio::test]
    async fn auth_expired_mid_drain_keeps_the_rest() {
        let queue = seeded(&["DIDI-1", "DIDI-2", "DIDI-3"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(200, accepted());
        transport.queue_response(401, json!({ "success": false, "error": "Token expiré" }));
        transport.queue_response(200, accepted());

        let result = coordinator.drain(&session()).await;

        assert!(matches!(result, Err(DrainError::AuthExpired)));
        assert_eq!(transport.request_count(), 2);
        let left = queue.list().await.unwrap();
        let payloads: Vec<_> = left.iter().map(|s| s.ticket_raw_payload.as_str()).collect();
        assert_eq!(payloads, vec!["DIDI-2", "DIDI-3"]);
        assert!(left.iter().all(|s| s.attempts == 0));
    }

    #[tokio::test]
    async fn replies_without_verdict_keep_the_scan() {
        let replies = [
            (200, json!("<html>Wi-Fi login</html>")),
            (403, json!("Forbidden")),
            (404, serde_json::Value::Null),
        ];
        for (status, body) in replies {
            let queue = seeded(&["DIDI-12345"]).await;
            let (coordinator, transport) = coordinator(Arc::clone(&queue));
            transport.queue_response(status, body);

            let report = coordinator.drain(&session()).await.unwrap();

            assert_eq!(report, DrainReport { synced: 0, failed: 1 }, "status {}", status);
            let left = queue.list().await.unwrap();
            assert_eq!(left.len(), 1, "status {}", status);
            assert_eq!(left[0].attempts, 1);
        }
    }

    #[tokio::test]
    async fn structured_payloads_are_resolved_on_replay() {
        let queue = seeded(&[r#"{"ticketId":"DIDI-55","event":"gala"}"#]).await;
        let (coordinator, transport) = coordinator(queue);
        transport.queue_response(200, accepted());

        coordinator.drain(&session()).await.unwrap();

        assert_eq!(submitted_paths(&transport), vec!["/tickets/DIDI-55/scan"]);
    }

    #[tokio::test]
    async fn retry_policy_parks_tired_items() {
        let queue = Arc::new(MemoryQueue::new());
        let tired = QueuedScan::new("DIDI-1", ControllerId::new("awa"))
            .with_failed_attempt()
            .with_failed_attempt();
        queue.push(tired.clone()).await;
        queue.enqueue("DIDI-2", &ControllerId::new("awa")).await.unwrap();

        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        let coordinator = coordinator.with_policy(RetryPolicy::from_limit(2));
        transport.queue_response(200, accepted());

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 1, failed: 0 });
        assert_eq!(submitted_paths(&transport), vec!["/tickets/DIDI-2/scan"]);
        assert_eq!(queue.list().await.unwrap(), vec![tired]);
    }

    // ===========================================
    // Scenario Tests
    // ===========================================

    #[tokio::test]
    async fn scenario_offline_then_recovery() {
        // Scan while the authority is down, then drain once it is back.
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(
            JsonlQueue::open(dir.path().join("scan-queue.jsonl"))
                .await
                .unwrap(),
        );
        queue.enqueue("DIDI-100", &ControllerId::new("awa")).await.unwrap();
        let (coordinator, transport) = coordinator(Arc::clone(&queue));

        transport.set_offline(true);
        let report = coordinator.drain(&session()).await.unwrap();
        assert_eq!(report, DrainReport { synced: 0, failed: 1 });
        assert_eq!(queue.list().await.unwrap()[0].attempts, 1);

        transport.set_offline(false);
        transport.queue_response(200, accepted());
        let report = coordinator.drain(&session()).await.unwrap();
        assert_eq!(report, DrainReport { synced: 1, failed: 0 });
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scenario_already_used_while_offline() {
        // Another gate redeemed the ticket before our queued scan replayed.
        let queue = seeded(&["DIDI-5"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(400, already_used());

        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 0, failed: 0 });
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scenario_connection_drops_mid_drain() {
        let queue = seeded(&["DIDI-1", "DIDI-2", "DIDI-3"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(200, accepted());
        // Nothing else scripted: the second replay finds the connection closed.

        let report = coordinator.drain(&session()).await.unwrap();
        assert_eq!(report, DrainReport { synced: 1, failed: 1 });

        for _ in 0..2 {
            transport.queue_response(200, accepted());
        }
        let report = coordinator.drain(&session()).await.unwrap();
        assert_eq!(report, DrainReport { synced: 2, failed: 0 });
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scenario_items_enqueued_during_drain_wait_for_next_run() {
        let queue = seeded(&["DIDI-1"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.set_delay(Some(Duration::from_millis(30)));
        transport.queue_response(200, accepted());

        let late = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                queue.enqueue("DIDI-2", &ControllerId::new("awa")).await.unwrap()
            })
        };

        let report = coordinator.drain(&session()).await.unwrap();
        let late_id = late.await.unwrap();

        assert_eq!(report, DrainReport { synced: 1, failed: 0 });
        let left = queue.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, late_id);
    }

    // ===========================================
    // Single-Flight Tests
    // ===========================================

    #[tokio::test]
    async fn concurrent_drains_submit_each_item_once() {
        let queue = seeded(&["DIDI-1", "DIDI-2", "DIDI-3"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        let coordinator = Arc::new(coordinator);
        transport.set_delay(Some(Duration::from_millis(20)));
        for _ in 0..6 {
            transport.queue_response(200, accepted());
        }

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain(&session()).await })
        };
        // Let the first drain take the gate.
        while !coordinator.is_draining() {
            tokio::task::yield_now().await;
        }
        let second = coordinator.drain(&session()).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, DrainReport { synced: 3, failed: 0 });
        assert_eq!(second, first);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(coordinator.generation(), 1);
    }

    #[tokio::test]
    async fn joiner_reruns_after_unreachable_drain() {
        let queue = seeded(&["DIDI-1"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        let coordinator = Arc::new(coordinator);
        transport.set_delay(Some(Duration::from_millis(20)));
        transport.queue_failure(TransportError::ConnectionFailed("refused".into()));
        transport.queue_response(200, accepted());

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain(&session()).await })
        };
        while !coordinator.is_draining() {
            tokio::task::yield_now().await;
        }
        let (session_b, session_c) = (session(), session());
        let (second, third) = tokio::join!(
            coordinator.drain(&session_b),
            coordinator.drain(&session_c)
        );
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, DrainReport { synced: 0, failed: 1 });
        assert_eq!(second.unwrap(), DrainReport { synced: 1, failed: 0 });
        assert_eq!(third.unwrap(), DrainReport { synced: 1, failed: 0 });
        assert_eq!(transport.request_count(), 2);
        assert_eq!(coordinator.generation(), 2);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn try_drain_returns_none_while_busy() {
        let queue = seeded(&["DIDI-1"]).await;
        let (coordinator, transport) = coordinator(queue);
        let coordinator = Arc::new(coordinator);
        transport.set_delay(Some(Duration::from_millis(20)));
        transport.queue_response(200, accepted());

        let running = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain(&session()).await })
        };
        while !coordinator.is_draining() {
            tokio::task::yield_now().await;
        }

        assert_eq!(coordinator.try_drain(&session()).await.unwrap(), None);
        running.await.unwrap().unwrap();

        // Idle again: try_drain runs.
        assert_eq!(
            coordinator.try_drain(&session()).await.unwrap(),
            Some(DrainReport::default())
        );
    }

    #[tokio::test]
    async fn sequential_drains_each_run() {
        let queue = seeded(&["DIDI-1"]).await;
        let (coordinator, transport) = coordinator(Arc::clone(&queue));
        transport.queue_response(200, accepted());

        coordinator.drain(&session()).await.unwrap();
        queue.enqueue("DIDI-2", &ControllerId::new("awa")).await.unwrap();
        transport.queue_response(200, accepted());
        let report = coordinator.drain(&session()).await.unwrap();

        assert_eq!(report, DrainReport { synced: 1, failed: 0 });
        assert_eq!(coordinator.generation(), 2);
    }
}
