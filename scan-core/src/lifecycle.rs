//! Per-scan lifecycle state machine.
//!
//! ```text
//! Captured ─► Submitting ─► Accepted | Rejected            (online path)
//!                  │
//!                  ▼
//!               Queued ◄──► Replaying ─► Accepted | Rejected  (offline path)
//! ```
//!
//! There is no "abandoned" state: a queued scan cycles between `Queued` and
//! `Replaying` until the authority gives a verdict.
//!
//! Like the rest of this crate, this is pure: the client feeds it events and
//! reads back the state.

use didi_scan_types::{FailureReason, QueuedScan, ValidationOutcome, ValidationStatus};

/// Where a scan is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Decoded, not yet submitted.
    Captured,
    /// First submission in flight.
    Submitting,
    /// Waiting in the offline queue.
    Queued {
        /// Failed replays so far.
        attempts: u32,
    },
    /// Replay in flight.
    Replaying {
        /// Failed replays before this one.
        attempts: u32,
    },
    /// The authority accepted the ticket.
    Accepted,
    /// The authority rejected the ticket.
    Rejected {
        /// Why.
        reason: FailureReason,
    },
}

/// Inputs to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A submission was dispatched.
    SubmitStarted,
    /// A queued scan is being replayed.
    ReplayStarted,
    /// The authority accepted.
    Accepted,
    /// The authority rejected.
    Rejected {
        /// Why.
        reason: FailureReason,
    },
    /// The authority could not be reached.
    Unreachable,
}

impl LifecycleEvent {
    /// The event corresponding to a submission outcome.
    pub fn from_outcome(outcome: &ValidationOutcome) -> Self {
        match outcome.status {
            ValidationStatus::Accepted => Self::Accepted,
            ValidationStatus::Rejected => Self::Rejected {
                reason: outcome.reason.unwrap_or(FailureReason::Unknown),
            },
            ValidationStatus::Unreachable => Self::Unreachable,
        }
    }
}

impl ScanState {
    /// A freshly decoded scan.
    pub fn new() -> Self {
        Self::Captured
    }

    /// State of a record loaded from the offline queue.
    pub fn for_queued(scan: &QueuedScan) -> Self {
        Self::Queued {
            attempts: scan.attempts,
        }
    }

    /// Process an event and return the new state.
    ///
    /// Invalid transitions leave the state unchanged.
    pub fn on_event(self, event: LifecycleEvent) -> Self {
        match (self, event) {
            (Self::Captured, LifecycleEvent::SubmitStarted) => Self::Submitting,
            // Known offline: queued without a network attempt.
            (Self::Captured, LifecycleEvent::Unreachable) => Self::Queued { attempts: 0 },

            (Self::Submitting, LifecycleEvent::Accepted) => Self::Accepted,
            (Self::Submitting, LifecycleEvent::Rejected { reason }) => Self::Rejected { reason },
            (Self::Submitting, LifecycleEvent::Unreachable) => Self::Queued { attempts: 0 },

            (Self::Queued { attempts }, LifecycleEvent::ReplayStarted) => {
                Self::Replaying { attempts }
            }

            (Self::Replaying { .. }, LifecycleEvent::Accepted) => Self::Accepted,
            (Self::Replaying { .. }, LifecycleEvent::Rejected { reason }) => {
                Self::Rejected { reason }
            }
            (Self::Replaying { attempts }, LifecycleEvent::Unreachable) => Self::Queued {
                attempts: attempts.saturating_add(1),
            },

            (state, _) => state,
        }
    }

    /// Whether the authority has given a verdict.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected { .. })
    }

    /// Whether the scan sits in (or is being replayed from) the offline queue.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued { .. } | Self::Replaying { .. })
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use didi_scan_types::ControllerId;

    #[test]
    fn online_accept_path() {
        let state = ScanState::new()
            .on_event(LifecycleEvent::SubmitStarted)
            .on_event(LifecycleEvent::Accepted);
        assert_eq!(state, ScanState::Accepted);
        assert!(state.is_terminal());
    }

    #[test]
    fn online_reject_path() {
        let state = ScanState::new()
            .on_event(LifecycleEvent::SubmitStarted)
            .on_event(LifecycleEvent::Rejected {
                reason: FailureReason::AlreadyUsed,
            });
        assert_eq!(
            state,
            ScanState::Rejected {
                reason: FailureReason::AlreadyUsed
            }
        );
    }

    #[test]
    fn unreachable_submission_is_queued() {
        let state = ScanState::new()
            .on_event(LifecycleEvent::SubmitStarted)
            .on_event(LifecycleEvent::Unreachable);
        assert_eq!(state, ScanState::Queued { attempts: 0 });
        assert!(state.is_pending());
    }

    #[test]
    fn known_offline_capture_goes_straight_to_queue() {
        let state = ScanState::new().on_event(LifecycleEvent::Unreachable);
        assert_eq!(state, ScanState::Queued { attempts: 0 });
    }

    #[test]
    fn replay_cycles_until_verdict() {
        let mut state = ScanState::Queued { attempts: 0 };
        for _ in 0..3 {
            state = state
                .on_event(LifecycleEvent::ReplayStarted)
                .on_event(LifecycleEvent::Unreachable);
        }
        assert_eq!(state, ScanState::Queued { attempts: 3 });

        let state = state
            .on_event(LifecycleEvent::ReplayStarted)
            .on_event(LifecycleEvent::Accepted);
        assert_eq!(state, ScanState::Accepted);
    }

    #[test]
    fn terminal_states_ignore_further_events() {
        let state = ScanState::Accepted
            .on_event(LifecycleEvent::ReplayStarted)
            .on_event(LifecycleEvent::Unreachable);
        assert_eq!(state, ScanState::Accepted);
    }

    #[test]
    fn captured_ignores_verdicts_before_submit() {
        let state = ScanState::new().on_event(LifecycleEvent::Accepted);
        assert_eq!(state, ScanState::Captured);
    }

    #[test]
    fn event_from_outcome() {
        let rejected =
            ValidationOutcome::rejected(FailureReason::Expired, "Billet expiré", None);
        assert_eq!(
            LifecycleEvent::from_outcome(&rejected),
            LifecycleEvent::Rejected {
                reason: FailureReason::Expired
            }
        );
        assert_eq!(
            LifecycleEvent::from_outcome(&ValidationOutcome::unreachable("x")),
            LifecycleEvent::Unreachable
        );
    }

    #[test]
    fn queued_record_state_carries_attempts() {
        let scan = QueuedScan::new("DIDI-1", ControllerId::new("c"))
            .with_failed_attempt()
            .with_failed_attempt();
        assert_eq!(
            ScanState::for_queued(&scan),
            ScanState::Queued { attempts: 2 }
        );
    }
}
