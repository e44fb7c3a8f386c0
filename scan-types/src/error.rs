//! Error types for didi-scan records.

use thiserror::Error;

/// Errors decoding or encoding a persisted scan record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record is not valid JSON or has the wrong shape.
    #[error("malformed record: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A required field is absent.
    #[error("record is missing field `{0}`")]
    MissingField(&'static str),
}
