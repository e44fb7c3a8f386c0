//! Identity types for didi-scan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace for ids derived from legacy queue records.
const LEGACY_SCAN_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x6b, 0x2f, 0x1c, 0x8e, 0x4a, 0x93, 0x4d, 0x52, 0x9f, 0x10, 0x3e, 0x77, 0xd1, 0x0c, 0x5a, 0x21,
]);

/// A unique identifier for a queued scan.
///
/// UUID v4 for new records. Stable across process restarts because it is
/// persisted with the record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(uuid::Uuid);

impl ScanId {
    /// Create a new random ScanId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Derive a deterministic ScanId from arbitrary bytes.
    ///
    /// Used for legacy records that were stored without a usable id: the same
    /// stored bytes always map to the same id.
    pub fn derived(bytes: &[u8]) -> Self {
        Self(uuid::Uuid::new_v5(&LEGACY_SCAN_NAMESPACE, bytes))
    }

    /// Parse a ScanId from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScanId({})", self.0)
    }
}

/// Canonical ticket identifier, as accepted by the authority's scan endpoint.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wrap a ticket identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TicketId({})", self.0)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of the controller (operator) who performed a scan.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(String);

impl ControllerId {
    /// Placeholder for records whose originator was never recorded.
    pub const UNKNOWN: &'static str = "unknown";

    /// Wrap a controller identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder controller for legacy records without one.
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerId({})", self.0)
    }
}
