//! Session id resolution through a plain request/response header.

use crate::request::{RequestContext, ResponseContext};
use crate::resolver::HttpSessionIdResolver;
use async_trait::async_trait;
use bearer_session_core::{Result, SessionId};
use bearer_session_oauth::TokenStoreError;

/// Resolves the session id from a header and echoes it on the response.
///
/// Clients that do not use OAuth2 can keep a session by replaying the
/// header value they were given. Expiring writes an empty value.
#[derive(Debug, Clone)]
pub struct HeaderSessionIdResolver {
    header_name: String,
}

impl HeaderSessionIdResolver {
    /// Header used by [`HeaderSessionIdResolver::x_auth_token`].
    pub const X_AUTH_TOKEN: &'static str = "X-Auth-Token";

    /// Creates a resolver using the given header name.
    #[must_use]
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    /// Creates a resolver using the `X-Auth-Token` header.
    #[must_use]
    pub fn x_auth_token() -> Self {
        Self::new(Self::X_AUTH_TOKEN)
    }

    /// Returns the header name.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

#[async_trait]
impl HttpSessionIdResolver for HeaderSessionIdResolver {
    async fn resolve_session_ids(
        &self,
        request: &RequestContext,
    ) -> Result<Vec<SessionId>, TokenStoreError> {
        Ok(request
            .header(&self.header_name)
            .filter(|value| !value.is_empty())
            .map(|value| vec![SessionId::from(value)])
            .unwrap_or_default())
    }

    async fn set_session_id(
        &self,
        _request: &RequestContext,
        response: &mut ResponseContext,
        session_id: &SessionId,
    ) -> Result<(), TokenStoreError> {
        response.set_header(&self.header_name, session_id.as_str());
        Ok(())
    }

    async fn expire_session(
        &self,
        _request: &RequestContext,
        response: &mut ResponseContext,
    ) -> Result<(), TokenStoreError> {
        response.set_header(&self.header_name, "");
        Ok(())
    }
}
