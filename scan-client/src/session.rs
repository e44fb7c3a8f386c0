//! Login and the shared session context.
//!
//! The scan engine never reaches for a global session. Hosts log in, put the
//! resulting [`Session`] into a [`SessionContext`], and hand clones of that
//! context to the pipeline and the connectivity monitor. When the authority
//! reports an expired credential the host clears the context and asks the
//! operator to log in again.

use didi_scan_types::{ApiEnvelope, ControllerId, Credential, LoginData, LoginRequest, Session};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::transport::{ApiRequest, Transport};
use crate::validation::ValidationClient;

/// Log in as a ticket controller.
///
/// Only accounts with the controller role get a session.
pub async fn login<T: Transport>(
    client: &ValidationClient<T>,
    username: &str,
    password: &str,
) -> Result<Session, ClientError> {
    let body = serde_json::to_value(LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    })
    .map_err(|e| ClientError::Protocol(e.to_string()))?;

    let response = client
        .execute(ApiRequest::post(["auth", "login"]).with_json(body))
        .await?;
    let envelope = ApiEnvelope::from_body(&response.body);

    if !response.is_success() || !envelope.success {
        let message = envelope
            .error_text()
            .unwrap_or("Erreur de connexion")
            .to_string();
        warn!(username, status = response.status, "login refused");
        return Err(ClientError::LoginFailed(message));
    }

    let data: LoginData = envelope
        .data
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ClientError::Protocol(format!("login response: {}", e)))?
        .ok_or_else(|| ClientError::Protocol("login response has no data".into()))?;

    if !data.user.is_controller() {
        return Err(ClientError::NotController {
            role: data.user.role,
        });
    }

    info!(controller = %data.user.username, "logged in");
    Ok(Session::new(
        ControllerId::new(data.user.username.as_str()),
        Credential::new(data.token.as_str()),
    ))
}

/// Shared holder for the current session.
///
/// Cloning is cheap; clones see the same session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    /// An empty context (logged out).
    pub fn new() -> Self {
        Self::default()
    }

    /// A context holding `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// The current session, if logged in.
    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    /// The current session, or [`ClientError::NoSession`].
    pub async fn require(&self) -> Result<Session, ClientError> {
        self.current().await.ok_or(ClientError::NoSession)
    }

    /// Install a new session, returning the previous one.
    pub async fn replace(&self, session: Session) -> Option<Session> {
        self.inner.write().await.replace(session)
    }

    /// Forget the session.
    pub async fn clear(&self) -> Option<Session> {
        self.inner.write().await.take()
    }
}
