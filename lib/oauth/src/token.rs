//! Access and refresh tokens.
//!
//! Tokens are value objects owned by a [`TokenStore`](crate::TokenStore).
//! Application code reads them, may mutate the additional-information map,
//! and re-stores them; it never changes a token's value.

use bearer_session_core::TokenValue;
use chrono::{DateTime, Duration, Utc};
use oauth2::Scope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Token type reported for every access token issued here.
pub const BEARER_TYPE: &str = "bearer";

/// Arbitrary metadata attached to an access token.
///
/// Opaque to the OAuth2 protocol; used by application code to stash
/// values such as the bound session id.
pub type AdditionalInformation = Map<String, JsonValue>;

/// A refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    value: TokenValue,
    expiration: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Creates a refresh token that never expires.
    #[must_use]
    pub fn new(value: impl Into<TokenValue>) -> Self {
        Self {
            value: value.into(),
            expiration: None,
        }
    }

    /// Creates a refresh token that expires after `validity`.
    #[must_use]
    pub fn expiring(value: impl Into<TokenValue>, validity: Duration) -> Self {
        Self {
            value: value.into(),
            expiration: Some(Utc::now() + validity),
        }
    }

    /// Returns the token value.
    #[must_use]
    pub fn value(&self) -> &TokenValue {
        &self.value
    }

    /// Returns when the token expires, if it does.
    #[must_use]
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Returns true if the token has an expiration in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiration.is_some_and(|at| Utc::now() >= at)
    }
}

/// An access token with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    value: TokenValue,
    token_type: String,
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    scope: Vec<Scope>,
    refresh_token: Option<RefreshToken>,
    #[serde(default)]
    additional_information: AdditionalInformation,
}

impl AccessToken {
    /// Creates a bearer token with no expiry, scope or metadata.
    #[must_use]
    pub fn new(value: impl Into<TokenValue>) -> Self {
        Self {
            value: value.into(),
            token_type: BEARER_TYPE.to_string(),
            expiration: None,
            scope: Vec::new(),
            refresh_token: None,
            additional_information: AdditionalInformation::new(),
        }
    }

    /// Sets the expiration to `validity` from now.
    #[must_use]
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.expiration = Some(Utc::now() + validity);
        self
    }

    /// Sets the granted scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Vec<Scope>) -> Self {
        self.scope = scope;
        self
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    /// Returns the token value.
    #[must_use]
    pub fn value(&self) -> &TokenValue {
        &self.value
    }

    /// Returns the token type.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns when the token expires, if it does.
    #[must_use]
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Returns the number of whole seconds until expiry, clamped at zero.
    #[must_use]
    pub fn expires_in(&self) -> Option<i64> {
        self.expiration
            .map(|at| (at - Utc::now()).num_seconds().max(0))
    }

    /// Returns true if the token has an expiration in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiration.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns the granted scope.
    #[must_use]
    pub fn scope(&self) -> &[Scope] {
        &self.scope
    }

    /// Returns the attached refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    /// Returns the additional-information map.
    #[must_use]
    pub fn additional_information(&self) -> &AdditionalInformation {
        &self.additional_information
    }

    /// Returns the additional-information map for in-place mutation.
    pub fn additional_information_mut(&mut self) -> &mut AdditionalInformation {
        &mut self.additional_information
    }

    /// Returns a string entry from the additional information.
    ///
    /// Entries holding any other JSON type read as absent.
    #[must_use]
    pub fn additional_str(&self, key: &str) -> Option<&str> {
        self.additional_information
            .get(key)
            .and_then(JsonValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_token_is_bearer_without_metadata() {
        let token = AccessToken::new("tok-1");
        assert_eq!(token.value().as_str(), "tok-1");
        assert_eq!(token.token_type(), BEARER_TYPE);
        assert!(token.expiration().is_none());
        assert!(token.additional_information().is_empty());
        assert!(!token.is_expired());
    }

    #[test]
    fn validity_sets_future_expiration() {
        let token = AccessToken::new("tok-1").with_validity(Duration::hours(1));
        assert!(!token.is_expired());
        let remaining = token.expires_in().expect("has expiry");
        assert!(remaining > 3500 && remaining <= 3600);
    }

    #[test]
    fn expired_token_reports_zero_seconds_left() {
        let token = AccessToken::new("tok-1").with_validity(Duration::seconds(-5));
        assert!(token.is_expired());
        assert_eq!(token.expires_in(), Some(0));
    }

    #[test]
    fn additional_str_ignores_non_string_entries() {
        let mut token = AccessToken::new("tok-1");
        token
            .additional_information_mut()
            .insert("count".to_string(), json!(3));
        token
            .additional_information_mut()
            .insert("name".to_string(), json!("alice"));

        assert_eq!(token.additional_str("name"), Some("alice"));
        assert_eq!(token.additional_str("count"), None);
        assert_eq!(token.additional_str("missing"), None);
    }

    #[test]
    fn refresh_token_expiry() {
        assert!(!RefreshToken::new("r-1").is_expired());
        assert!(RefreshToken::expiring("r-1", Duration::seconds(-1)).is_expired());
        assert!(!RefreshToken::expiring("r-1", Duration::days(1)).is_expired());
    }

    #[test]
    fn token_serialization_keeps_metadata() {
        let mut token = AccessToken::new("tok-1")
            .with_scope(vec![Scope::new("rest-api".to_string())])
            .with_refresh_token(RefreshToken::new("r-1"));
        token
            .additional_information_mut()
            .insert("k".to_string(), json!("v"));

        let json = serde_json::to_string(&token).expect("serialize");
        let parsed: AccessToken = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, token);
    }
}
