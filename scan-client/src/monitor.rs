//! Connectivity monitor: drains the offline queue when the network returns.
//!
//! The host feeds a level signal ("network available") through a
//! [`tokio::sync::watch`] channel. The monitor turns it into edges with
//! [`didi_scan_core::Connectivity`], broadcasts them, and on every
//! offline→online edge starts a drain with the current session.
//!
//! Drains run in their own task so a slow replay never delays the next
//! connectivity edge. Overlapping drains are coalesced by the coordinator.
//!
//! Hosts without a platform signal use [`ConnectivityProbe`], which polls the
//! authority and publishes into a watch channel.

use didi_scan_core::{Connectivity, Transition};
use didi_scan_types::DrainReport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::coordinator::SyncCoordinator;
use crate::error::DrainError;
use crate::queue::ScanQueue;
use crate::session::SessionContext;
use crate::transport::Transport;

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 64;

/// A connectivity edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The network came back.
    Online,
    /// The network went away.
    Offline,
}

impl From<Transition> for ConnectivityEvent {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::WentOnline => Self::Online,
            Transition::WentOffline => Self::Offline,
        }
    }
}

/// Everything the monitor reports to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A connectivity edge.
    Connectivity(ConnectivityEvent),
    /// A reconnect drain finished.
    Drained(DrainReport),
    /// The authority refused the session during a drain; log in again.
    AuthExpired,
    /// A reconnect drain failed for another reason.
    DrainFailed(String),
    /// Came online with nobody logged in; nothing was drained.
    NoSession,
}

/// Turns connectivity signals into drains.
pub struct ConnectivityMonitor<T: Transport, Q: ScanQueue> {
    coordinator: Arc<SyncCoordinator<T, Q>>,
    sessions: SessionContext,
    events: broadcast::Sender<MonitorEvent>,
    settle: Duration,
    state: Connectivity,
    online: Arc<AtomicBool>,
    drains: Vec<JoinHandle<()>>,
}

impl<T, Q> ConnectivityMonitor<T, Q>
where
    T: Transport + 'static,
    Q: ScanQueue + 'static,
{
    /// Create a monitor with no settle delay.
    pub fn new(coordinator: Arc<SyncCoordinator<T, Q>>, sessions: SessionContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            coordinator,
            sessions,
            events,
            settle: Duration::ZERO,
            state: Connectivity::new(),
            online: Arc::new(AtomicBool::new(false)),
            drains: Vec::new(),
        }
    }

    /// Wait this long after an online edge, and skip the drain if the
    /// network dropped again meanwhile.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Receive monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Last known connectivity.
    pub fn state(&self) -> Connectivity {
        self.state
    }

    /// Feed one level observation.
    pub fn on_signal(&mut self, available: bool) -> Option<Transition> {
        let (state, transition) = self.state.on_signal(available);
        self.state = state;
        self.online.store(available, Ordering::Release);

        let transition = transition?;
        info!(?transition, "connectivity changed");
        let _ = self
            .events
            .send(MonitorEvent::Connectivity(transition.into()));

        if transition == Transition::WentOnline {
            self.spawn_drain();
        }
        Some(transition)
    }

    /// Wait for every drain started so far to finish.
    pub async fn wait_for_drains(&mut self) {
        for handle in self.drains.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "drain task failed");
            }
        }
    }

    /// Follow `signal` until its sender is dropped, then wait for drains.
    pub async fn run(mut self, mut signal: watch::Receiver<bool>) {
        loop {
            let available = *signal.borrow_and_update();
            self.on_signal(available);
            if signal.changed().await.is_err() {
                break;
            }
        }
        debug!("connectivity signal closed");
        self.wait_for_drains().await;
    }

    fn spawn_drain(&mut self) {
        self.drains.retain(|handle| !handle.is_finished());

        let coordinator = Arc::clone(&self.coordinator);
        let sessions = self.sessions.clone();
        let events = self.events.clone();
        let online = Arc::clone(&self.online);
        let settle = self.settle;

        self.drains.push(tokio::spawn(async move {
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
                if !online.load(Ordering::Acquire) {
                    debug!("connectivity dropped while settling; drain skipped");
                    return;
                }
            }

            let Some(session) = sessions.current().await else {
                debug!("online without a session; drain skipped");
                let _ = events.send(MonitorEvent::NoSession);
                return;
            };

            let event = match coordinator.drain(&session).await {
                Ok(report) => MonitorEvent::Drained(report),
                Err(DrainError::AuthExpired) => MonitorEvent::AuthExpired,
                Err(e) => {
                    warn!(error = %e, "reconnect drain failed");
                    MonitorEvent::DrainFailed(e.to_string())
                }
            };
            let _ = events.send(event);
        }));
    }
}

/// Polls the authority and publishes reachability into a watch channel.
#[derive(Debug)]
pub struct ConnectivityProbe<T: Transport> {
    transport: T,
    interval: Duration,
}

impl<T: Transport + 'static> ConnectivityProbe<T> {
    /// Create a probe.
    pub fn new(transport: T, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    /// Probe once, then keep probing in the background.
    ///
    /// The task ends when every receiver is dropped.
    pub async fn start(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
        let initial = self.transport.probe().await;
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; we just probed.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {
                        let up = self.transport.probe().await;
                        tx.send_if_modified(|current| {
                            let changed = *current != up;
                            *current = up;
                            changed
                        });
                    }
                }
            }
            debug!("probe stopped");
        });

        (rx, handle)
    }
}
