//! Connectivity edge detection.
//!
//! The host platform reports "network available" as a level signal that may
//! repeat the same value many times. This state machine turns it into edges:
//! exactly one [`Transition`] per real change. Pure, no timers; debouncing is
//! left to the caller.

/// Last known connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No signal observed yet.
    #[default]
    Unknown,
    /// The authority is reachable.
    Online,
    /// The authority is not reachable.
    Offline,
}

/// An observed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Connectivity was restored (or first observed as available).
    WentOnline,
    /// Connectivity was lost (or first observed as unavailable).
    WentOffline,
}

impl Connectivity {
    /// Create a machine with no observation yet.
    pub fn new() -> Self {
        Self::Unknown
    }

    /// Feed one level observation, returning the new state and the edge, if any.
    ///
    /// The first observation always produces an edge so a queue left over
    /// from a previous run is drained as soon as the host reports online.
    pub fn on_signal(self, available: bool) -> (Self, Option<Transition>) {
        match (self, available) {
            (Self::Online, true) => (Self::Online, None),
            (Self::Offline, false) => (Self::Offline, None),
            (Self::Unknown | Self::Offline, true) => (Self::Online, Some(Transition::WentOnline)),
            (Self::Unknown | Self::Online, false) => {
                (Self::Offline, Some(Transition::WentOffline))
            }
        }
    }

    /// Whether the last observation was online.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }

    /// Whether the last observation was offline.
    ///
    /// `Unknown` is neither: callers should still try the network.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}
