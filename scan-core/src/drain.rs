//! Drain decision rules.
//!
//! The sync coordinator replays queued scans one by one. What it does with
//! each result is decided here, without I/O:
//!
//! | Replay result | Queue action | Tally | Continue? |
//! |---|---|---|---|
//! | Accepted | remove | `synced += 1` | yes |
//! | Rejected | remove | none | yes |
//! | Unreachable | replace with `attempts + 1` | `failed += 1` | no |
//! | AuthExpired | none | none | abort with error |

use didi_scan_types::{DrainReport, QueuedScan, ValidationStatus};

/// Result of replaying one queued scan, as seen by the drain rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayResult {
    /// The authority answered (or could not be reached).
    Outcome(ValidationStatus),
    /// The session credential was refused.
    AuthExpired,
}

/// What to do with the replayed item and the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainDecision {
    /// Definitive verdict: delete the record and continue.
    Remove {
        /// Whether the verdict counts as synced.
        synced: bool,
    },
    /// No verdict: keep the record with one more attempt, stop this run.
    RetainAndStop,
    /// Session is gone: stop immediately without touching the queue.
    Abort,
}

impl DrainDecision {
    /// Whether the run should move on to the next item.
    pub fn continues(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}

/// Decide what a replay result means for the queue.
pub fn decide(result: ReplayResult) -> DrainDecision {
    match result {
        ReplayResult::Outcome(ValidationStatus::Accepted) => DrainDecision::Remove { synced: true },
        ReplayResult::Outcome(ValidationStatus::Rejected) => {
            DrainDecision::Remove { synced: false }
        }
        ReplayResult::Outcome(ValidationStatus::Unreachable) => DrainDecision::RetainAndStop,
        ReplayResult::AuthExpired => DrainDecision::Abort,
    }
}

/// Retry policy for queued scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Skip items that already failed this many times. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry every item on every drain.
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Build from a config value where 0 means unbounded.
    pub fn from_limit(limit: u32) -> Self {
        Self {
            max_attempts: (limit > 0).then_some(limit),
        }
    }

    /// Whether a drain should attempt this item.
    ///
    /// Over-limit items are parked, never deleted.
    pub fn should_attempt(&self, scan: &QueuedScan) -> bool {
        self.max_attempts
            .map(|max| scan.attempts < max)
            .unwrap_or(true)
    }
}

/// Running counts for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainTally {
    report: DrainReport,
    removed: u32,
    skipped: u32,
}

impl DrainTally {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision.
    pub fn apply(&mut self, decision: DrainDecision) {
        match decision {
            DrainDecision::Remove { synced } => {
                self.removed += 1;
                if synced {
                    self.report.synced += 1;
                }
            }
            DrainDecision::RetainAndStop => self.report.failed += 1,
            DrainDecision::Abort => {}
        }
    }

    /// Record an item skipped by the retry policy.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Records deleted so far (accepted plus rejected).
    pub fn removed(&self) -> u32 {
        self.removed
    }

    /// Items skipped by the retry policy.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// The report for the caller.
    pub fn finish(self) -> DrainReport {
        self.report
    }
}
