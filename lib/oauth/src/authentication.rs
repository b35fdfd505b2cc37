//! The authentication a token was issued for.

use bearer_session_core::SessionId;
use oauth2::{ClientId, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Details recorded by the REST token endpoint at issuance time.
///
/// The session id is the web session that was current when the token was
/// granted, so that a later refresh can restore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestAuthDetails {
    session_id: SessionId,
    remote_address: Option<String>,
}

impl RestAuthDetails {
    /// Creates REST details for the given session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            remote_address: None,
        }
    }

    /// Records the caller's remote address.
    #[must_use]
    pub fn with_remote_address(mut self, remote_address: impl Into<String>) -> Self {
        self.remote_address = Some(remote_address.into());
        self
    }

    /// Returns the session id captured at issuance.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the caller's remote address, if recorded.
    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }
}

/// Opaque details attached to an authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AuthDetails {
    /// Details from the REST token endpoint, carrying a session id.
    Rest(RestAuthDetails),
    /// Any other details; never carries a session id.
    Other(JsonValue),
}

/// Associates a token with the caller's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    client_id: ClientId,
    principal: Option<String>,
    #[serde(default)]
    scopes: Vec<Scope>,
    details: Option<AuthDetails>,
}

impl Authentication {
    /// Creates a client-only authentication with no scopes or details.
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            principal: None,
            scopes: Vec::new(),
            details: None,
        }
    }

    /// Sets the authenticated user principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Attaches details.
    #[must_use]
    pub fn with_details(mut self, details: AuthDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns the client the token was issued to.
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the user principal, if this is not a client-only grant.
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Returns the principal name, falling back to the client id.
    #[must_use]
    pub fn name(&self) -> &str {
        self.principal
            .as_deref()
            .unwrap_or_else(|| self.client_id.as_str())
    }

    /// Returns the granted scopes.
    #[must_use]
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Returns the attached details.
    #[must_use]
    pub fn details(&self) -> Option<&AuthDetails> {
        self.details.as_ref()
    }

    /// Returns true if this is a client-only authentication.
    #[must_use]
    pub fn is_client_only(&self) -> bool {
        self.principal.is_none()
    }
}
