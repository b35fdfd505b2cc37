//! Session id resolution backed by the token store.

use crate::keys::{
    ACCESS_TOKEN_KEY, ACCESS_TOKEN_VALUE_ATTRIBUTE, GRANT_TYPE_PARAM, REFRESH_TOKEN_GRANT,
    REFRESH_TOKEN_PARAM, SESSION_ID_KEY,
};
use crate::request::{RequestContext, ResponseContext};
use async_trait::async_trait;
use bearer_session_core::{Result, SessionId, TokenValue};
use bearer_session_oauth::{AuthDetails, TokenStore, TokenStoreError};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Strategy for mapping requests to web session ids.
///
/// A web layer calls `resolve_session_ids` when a request arrives,
/// `set_session_id` when it commits a session, and `expire_session` when a
/// session is invalidated.
#[async_trait]
pub trait HttpSessionIdResolver: Send + Sync {
    /// Returns the session ids associated with the request, most relevant first.
    ///
    /// An empty list means no session can be restored.
    async fn resolve_session_ids(
        &self,
        request: &RequestContext,
    ) -> Result<Vec<SessionId>, TokenStoreError>;

    /// Associates `session_id` with the client that sent the request.
    async fn set_session_id(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
        session_id: &SessionId,
    ) -> Result<(), TokenStoreError>;

    /// Dissociates the client that sent the request from its session.
    async fn expire_session(
        &self,
        request: &RequestContext,
        response: &mut ResponseContext,
    ) -> Result<(), TokenStoreError>;
}

/// Resolves session ids through OAuth2 access tokens.
///
/// The session id lives in the access token's additional information under
/// [`SESSION_ID_KEY`], so sessions are stateful per token. During a refresh
/// grant, when no access token accompanies the request, the session id is
/// recovered from the REST details of the refresh token's authentication.
///
/// Expiring a session removes the access token from the store, which also
/// revokes it.
///
/// Reads and writes against the store are not synchronized: two requests
/// setting different session ids on the same token race, and the last write
/// wins.
#[derive(Clone)]
pub struct AccessTokenSessionIdResolver {
    token_store: Arc<dyn TokenStore>,
}

impl AccessTokenSessionIdResolver {
    /// Creates a resolver over the given token store.
    #[must_use]
    pub fn new(token_store: Arc<dyn TokenStore>) -> Self {
        Self { token_store }
    }

    /// Returns true if the request is an OAuth2 refresh grant.
    #[must_use]
    pub fn is_refresh_token_requested(request: &RequestContext) -> bool {
        request.parameter(GRANT_TYPE_PARAM) == Some(REFRESH_TOKEN_GRANT)
    }

    fn token_value_from_request(request: &RequestContext) -> Option<TokenValue> {
        request
            .attribute(ACCESS_TOKEN_VALUE_ATTRIBUTE)
            .map(TokenValue::from)
    }

    async fn session_id_from_refresh_grant(
        &self,
        request: &RequestContext,
    ) -> Result<Option<SessionId>, TokenStoreError> {
        let Some(refresh_value) = request.parameter(REFRESH_TOKEN_PARAM) else {
            return Ok(None);
        };
        let Some(refresh_token) = self
            .token_store
            .read_refresh_token(&TokenValue::from(refresh_value))
            .await?
        else {
            return Ok(None);
        };
        let authentication = self
            .token_store
            .read_authentication_for_refresh_token(&refresh_token)
            .await?;

        Ok(match authentication.as_ref().and_then(|a| a.details()) {
            Some(AuthDetails::Rest(details)) => Some(details.session_id().clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl HttpSessionIdResolver for AccessTokenSessionIdResolver {
    #[instrument(skip_all)]
    async fn resolve_session_ids(
        &self,
        request: &RequestContext,
    ) -> Result<Vec<SessionId>, TokenStoreError> {
        if let Some(token_value) = Self::token_value_from_request(request) {
            let token = self.token_store.read_access_token(&token_value).await?;
            if let Some(session_id) = token.as_ref().and_then(|t| t.additional_str(SESSION_ID_KEY))
            {
                trace!(%session_id, "session resolved from access token");
                return Ok(vec![SessionId::from(session_id)]);
            }
        } else if Self::is_refresh_token_requested(request) {
            if let Some(session_id) = self.session_id_from_refresh_grant(request).await? {
                trace!(%session_id, "session resolved from refresh token");
                return Ok(vec![session_id]);
            }
        }

        Ok(Vec::new())
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn set_session_id(
        &self,
        request: &RequestContext,
        _response: &mut ResponseContext,
        session_id: &SessionId,
    ) -> Result<(), TokenStoreError> {
        let token_value = Self::token_value_from_request(request).or_else(|| {
            request
                .session_data()
                .str_attribute(ACCESS_TOKEN_KEY)
                .map(TokenValue::from)
        });
        let Some(token_value) = token_value else {
            trace!("no access token on request, session id not bound");
            return Ok(());
        };
        let Some(mut token) = self.token_store.read_access_token(&token_value).await? else {
            return Ok(());
        };

        if token.additional_str(SESSION_ID_KEY) == Some(session_id.as_str()) {
            return Ok(());
        }

        token.additional_information_mut().insert(
            SESSION_ID_KEY.to_string(),
            JsonValue::String(session_id.to_string()),
        );
        match self.token_store.read_authentication(&token).await? {
            Some(authentication) => {
                self.token_store
                    .store_access_token(&token, &authentication)
                    .await?;
                debug!("session id bound to access token");
            }
            None => warn!("access token has no stored authentication, session id not bound"),
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn expire_session(
        &self,
        request: &RequestContext,
        _response: &mut ResponseContext,
    ) -> Result<(), TokenStoreError> {
        let Some(token_value) = Self::token_value_from_request(request) else {
            return Ok(());
        };
        if let Some(token) = self.token_store.read_access_token(&token_value).await? {
            self.token_store.remove_access_token(&token).await?;
            debug!("access token removed with its session");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::SessionData;
    use bearer_session_oauth::{
        AccessToken, Authentication, InMemoryTokenStore, RefreshToken, RestAuthDetails,
    };
    use oauth2::ClientId;
    use serde_json::json;

    fn authentication() -> Authentication {
        Authentication::new(ClientId::new("web-client".to_string()))
    }

    fn bearer(value: &str) -> RequestContext {
        RequestContext::new().with_attribute(ACCESS_TOKEN_VALUE_ATTRIBUTE, value)
    }

    fn refresh_grant(value: &str) -> RequestContext {
        RequestContext::new()
            .with_parameter(GRANT_TYPE_PARAM, REFRESH_TOKEN_GRANT)
            .with_parameter(REFRESH_TOKEN_PARAM, value)
    }

    async fn store_with_token(token: &AccessToken) -> Arc<InMemoryTokenStore> {
        let store = Arc::new(InMemoryTokenStore::new());
        store
            .store_access_token(token, &authentication())
            .await
            .unwrap();
        store
    }

    fn with_session(value: &str, session_id: &str) -> AccessToken {
        let mut token = AccessToken::new(value);
        token
            .additional_information_mut()
            .insert(SESSION_ID_KEY.to_string(), json!(session_id));
        token
    }

    #[tokio::test]
    async fn resolves_session_id_stored_on_access_token() {
        let store = store_with_token(&with_session("tok-1", "sess-A")).await;
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver.resolve_session_ids(&bearer("tok-1")).await.unwrap();

        assert_eq!(ids, vec![SessionId::new("sess-A")]);
    }

    #[tokio::test]
    async fn unknown_access_token_resolves_nothing() {
        let resolver = AccessTokenSessionIdResolver::new(Arc::new(InMemoryTokenStore::new()));

        let ids = resolver.resolve_session_ids(&bearer("tok-1")).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn access_token_without_session_resolves_nothing() {
        let store = store_with_token(&AccessToken::new("tok-1")).await;
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver.resolve_session_ids(&bearer("tok-1")).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn non_string_session_entry_is_ignored() {
        let mut token = AccessToken::new("tok-1");
        token
            .additional_information_mut()
            .insert(SESSION_ID_KEY.to_string(), json!(42));
        let store = store_with_token(&token).await;
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver.resolve_session_ids(&bearer("tok-1")).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn refresh_grant_resolves_rest_details_session() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresh = RefreshToken::new("r-1");
        let auth = authentication().with_details(AuthDetails::Rest(RestAuthDetails::new(
            SessionId::new("sess-R"),
        )));
        store.store_refresh_token(&refresh, &auth).await.unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver
            .resolve_session_ids(&refresh_grant("r-1"))
            .await
            .unwrap();

        assert_eq!(ids, vec![SessionId::new("sess-R")]);
    }

    #[tokio::test]
    async fn refresh_grant_with_other_details_resolves_nothing() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresh = RefreshToken::new("r-1");
        let auth = authentication().with_details(AuthDetails::Other(json!({"ip": "10.0.0.1"})));
        store.store_refresh_token(&refresh, &auth).await.unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver
            .resolve_session_ids(&refresh_grant("r-1"))
            .await
            .unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn refresh_grant_without_refresh_token_resolves_nothing() {
        let store = Arc::new(InMemoryTokenStore::new());
        let auth = authentication().with_details(AuthDetails::Rest(RestAuthDetails::new(
            SessionId::new("sess-R"),
        )));
        store
            .store_refresh_token(&RefreshToken::new("r-1"), &auth)
            .await
            .unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);
        let request = RequestContext::new().with_parameter(GRANT_TYPE_PARAM, REFRESH_TOKEN_GRANT);

        let ids = resolver.resolve_session_ids(&request).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn refresh_grant_with_unknown_refresh_token_resolves_nothing() {
        let store = Arc::new(InMemoryTokenStore::new());
        let auth = authentication().with_details(AuthDetails::Rest(RestAuthDetails::new(
            SessionId::new("sess-R"),
        )));
        store
            .store_refresh_token(&RefreshToken::new("r-1"), &auth)
            .await
            .unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);

        let ids = resolver
            .resolve_session_ids(&refresh_grant("r-unknown"))
            .await
            .unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn refresh_parameters_without_grant_type_are_ignored() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresh = RefreshToken::new("r-1");
        let auth = authentication().with_details(AuthDetails::Rest(RestAuthDetails::new(
            SessionId::new("sess-R"),
        )));
        store.store_refresh_token(&refresh, &auth).await.unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);
        let request = RequestContext::new().with_parameter(REFRESH_TOKEN_PARAM, "r-1");

        let ids = resolver.resolve_session_ids(&request).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn access_token_attribute_takes_precedence_over_refresh_grant() {
        let store = Arc::new(InMemoryTokenStore::new());
        let refresh = RefreshToken::new("r-1");
        let auth = authentication().with_details(AuthDetails::Rest(RestAuthDetails::new(
            SessionId::new("sess-R"),
        )));
        store.store_refresh_token(&refresh, &auth).await.unwrap();
        let resolver = AccessTokenSessionIdResolver::new(store);
        let request = refresh_grant("r-1").with_attribute(ACCESS_TOKEN_VALUE_ATTRIBUTE, "tok-x");

        let ids = resolver.resolve_session_ids(&request).await.unwrap();

        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn set_session_id_binds_and_resolves() {
        let store = store_with_token(&AccessToken::new("tok-1")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let request = bearer("tok-1");

        resolver
            .set_session_id(&request, &mut ResponseContext::new(), &SessionId::new("sess-A"))
            .await
            .unwrap();

        let stored = store
            .read_access_token(&TokenValue::new("tok-1"))
            .await
            .unwrap()
            .expect("token kept");
        assert_eq!(stored.additional_str(SESSION_ID_KEY), Some("sess-A"));
        let ids = resolver.resolve_session_ids(&request).await.unwrap();
        assert_eq!(ids, vec![SessionId::new("sess-A")]);
        // Authentication survives the re-store.
        assert_eq!(
            store.read_authentication(&stored).await.unwrap(),
            Some(authentication())
        );
    }

    #[tokio::test]
    async fn set_session_id_is_idempotent() {
        let store = store_with_token(&AccessToken::new("tok-1")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let request = bearer("tok-1");
        let session_id = SessionId::new("sess-A");
        let writes_before = store.access_token_writes();

        resolver
            .set_session_id(&request, &mut ResponseContext::new(), &session_id)
            .await
            .unwrap();
        resolver
            .set_session_id(&request, &mut ResponseContext::new(), &session_id)
            .await
            .unwrap();

        assert_eq!(store.access_token_writes() - writes_before, 1);
    }

    #[tokio::test]
    async fn set_session_id_overwrites_different_id() {
        let store = store_with_token(&with_session("tok-1", "sess-A")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let request = bearer("tok-1");

        resolver
            .set_session_id(&request, &mut ResponseContext::new(), &SessionId::new("sess-B"))
            .await
            .unwrap();

        let ids = resolver.resolve_session_ids(&request).await.unwrap();
        assert_eq!(ids, vec![SessionId::new("sess-B")]);
    }

    #[tokio::test]
    async fn set_session_id_falls_back_to_stashed_token() {
        let store = store_with_token(&AccessToken::new("tok-new")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let mut session_data = SessionData::new();
        session_data.set_attribute(ACCESS_TOKEN_KEY, "tok-new");
        let request = RequestContext::new().with_session_data(session_data);

        resolver
            .set_session_id(&request, &mut ResponseContext::new(), &SessionId::new("sess-A"))
            .await
            .unwrap();

        let ids = resolver
            .resolve_session_ids(&bearer("tok-new"))
            .await
            .unwrap();
        assert_eq!(ids, vec![SessionId::new("sess-A")]);
    }

    #[tokio::test]
    async fn set_session_id_without_token_is_a_no_op() {
        let store = Arc::new(InMemoryTokenStore::new());
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let mut response = ResponseContext::new();

        resolver
            .set_session_id(&RequestContext::new(), &mut response, &SessionId::new("sess-A"))
            .await
            .unwrap();
        resolver
            .set_session_id(&bearer("unknown"), &mut response, &SessionId::new("sess-A"))
            .await
            .unwrap();

        assert_eq!(store.access_token_writes(), 0);
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn expire_session_removes_access_token() {
        let store = store_with_token(&with_session("tok-1", "sess-A")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());
        let request = bearer("tok-1");

        resolver
            .expire_session(&request, &mut ResponseContext::new())
            .await
            .unwrap();

        assert!(resolver.resolve_session_ids(&request).await.unwrap().is_empty());
        assert_eq!(store.access_token_count().await, 0);
    }

    #[tokio::test]
    async fn expire_session_without_token_is_a_no_op() {
        let store = store_with_token(&with_session("tok-1", "sess-A")).await;
        let resolver = AccessTokenSessionIdResolver::new(store.clone());

        resolver
            .expire_session(&RequestContext::new(), &mut ResponseContext::new())
            .await
            .unwrap();
        resolver
            .expire_session(&bearer("other"), &mut ResponseContext::new())
            .await
            .unwrap();

        assert_eq!(store.access_token_count().await, 1);
    }

    /// A store whose every call fails.
    struct UnavailableStore;

    #[async_trait]
    impl TokenStore for UnavailableStore {
        async fn read_access_token(
            &self,
            _value: &TokenValue,
        ) -> Result<Option<AccessToken>, TokenStoreError> {
            Err(unavailable())
        }

        async fn read_authentication(
            &self,
            _token: &AccessToken,
        ) -> Result<Option<Authentication>, TokenStoreError> {
            Err(unavailable())
        }

        async fn store_access_token(
            &self,
            _token: &AccessToken,
            _authentication: &Authentication,
        ) -> Result<(), TokenStoreError> {
            Err(unavailable())
        }

        async fn remove_access_token(&self, _token: &AccessToken) -> Result<(), TokenStoreError> {
            Err(unavailable())
        }

        async fn read_refresh_token(
            &self,
            _value: &TokenValue,
        ) -> Result<Option<RefreshToken>, TokenStoreError> {
            Err(unavailable())
        }

        async fn read_authentication_for_refresh_token(
            &self,
            _token: &RefreshToken,
        ) -> Result<Option<Authentication>, TokenStoreError> {
            Err(unavailable())
        }

        async fn store_refresh_token(
            &self,
            _token: &RefreshToken,
            _authentication: &Authentication,
        ) -> Result<(), TokenStoreError> {
            Err(unavailable())
        }

        async fn remove_refresh_token(&self, _token: &RefreshToken) -> Result<(), TokenStoreError> {
            Err(unavailable())
        }

        async fn remove_access_token_using_refresh_token(
            &self,
            _token: &RefreshToken,
        ) -> Result<(), TokenStoreError> {
            Err(unavailable())
        }
    }

    fn unavailable() -> rootcause::Report<TokenStoreError> {
        TokenStoreError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let resolver = AccessTokenSessionIdResolver::new(Arc::new(UnavailableStore));

        let err = resolver
            .resolve_session_ids(&bearer("tok-1"))
            .await
            .expect_err("store is down");
        assert!(err.to_string().contains("connection refused"));

        assert!(
            resolver
                .expire_session(&bearer("tok-1"), &mut ResponseContext::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn requests_without_token_never_touch_the_store() {
        let resolver = AccessTokenSessionIdResolver::new(Arc::new(UnavailableStore));

        let ids = resolver
            .resolve_session_ids(&RequestContext::new())
            .await
            .unwrap();
        assert!(ids.is_empty());
        resolver
            .expire_session(&RequestContext::new(), &mut ResponseContext::new())
            .await
            .unwrap();
    }
}
