//! Client error types.

use thiserror::Error;

use crate::queue::QueueError;
use crate::transport::TransportError;

/// Errors from talking to the authority.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The authority refused the session credential (HTTP 401).
    #[error("session expired; log in again")]
    AuthExpired,

    /// Login was refused.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// The account exists but may not scan tickets.
    #[error("account role {role:?} is not allowed to scan tickets")]
    NotController {
        /// Role the authority reported.
        role: String,
    },

    /// No session is available.
    #[error("not logged in")]
    NoSession,

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// The authority answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether the authority could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_unreachable())
    }
}

/// Errors that abort a drain of the offline queue.
#[derive(Debug, Error)]
pub enum DrainError {
    /// The session credential was refused; nothing more was removed.
    #[error("session expired during sync; log in again")]
    AuthExpired,

    /// The queue could not be read or rewritten.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// A replay failed in a way that is neither a verdict nor unreachable.
    #[error("replay failed: {0}")]
    Client(ClientError),
}

impl From<ClientError> for DrainError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::AuthExpired => DrainError::AuthExpired,
            ClientError::Queue(q) => DrainError::Queue(q),
            other => DrainError::Client(other),
        }
    }
}
