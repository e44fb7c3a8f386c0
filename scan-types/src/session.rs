//! Session context supplied by the identity provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ControllerId;

/// Role the authority assigns to ticket controllers.
pub const CONTROLLER_ROLE: &str = "controleur";

/// Bearer credential. Zeroed on drop, never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Expose the token for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Authenticated controller context. Read-only for the scan engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Controller who owns this session.
    pub controller_id: ControllerId,
    /// Bearer credential for the authority.
    pub credential: Credential,
}

impl Session {
    /// Create a session.
    pub fn new(controller_id: ControllerId, credential: Credential) -> Self {
        Self {
            controller_id,
            credential,
        }
    }
}

/// User profile returned by the authority on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerProfile {
    /// Login name; used as the controller id.
    pub username: String,
    /// Authority-side role.
    #[serde(default)]
    pub role: String,
}

impl ControllerProfile {
    /// Whether this user may scan tickets.
    pub fn is_controller(&self) -> bool {
        self.role == CONTROLLER_ROLE
    }
}
