//! HTTP handlers: the OAuth2 token endpoint and the session API.

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use bearer_session_core::{SessionId, TokenValue};
use bearer_session_oauth::{AccessToken, AuthDetails, Authentication, RestAuthDetails};
use bearer_session_resolver::ACCESS_TOKEN_KEY;
use oauth2::Scope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{ClientConfig, parse_scope};
use crate::error::{OAuthErrorCode, ServerError};
use crate::middleware::{Authenticated, CurrentSession};
use crate::state::AppState;

/// Form fields accepted by the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token endpoint response.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&AccessToken> for TokenResponse {
    fn from(token: &AccessToken) -> Self {
        let scope = token
            .scope()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            access_token: token.value().to_string(),
            token_type: token.token_type().to_string(),
            expires_in: token.expires_in(),
            refresh_token: token.refresh_token().map(|r| r.value().to_string()),
            scope: (!scope.is_empty()).then_some(scope),
        }
    }
}

/// The session as exposed to its owner.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub principal: String,
    pub attributes: Map<String, JsonValue>,
}

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// OAuth2 token endpoint.
///
/// Supports the `client_credentials` and `refresh_token` grants. The issued
/// token is stashed in the current session so the session filter can bind
/// the session to it.
#[instrument(skip_all)]
pub async fn token(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, ServerError> {
    let (Some(client_id), Some(client_secret)) = (
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    ) else {
        return Err(ServerError::oauth(
            OAuthErrorCode::InvalidClient,
            "client credentials are required",
        ));
    };
    if !state.client.authenticates(client_id, client_secret) {
        return Err(ServerError::oauth(
            OAuthErrorCode::InvalidClient,
            "bad client credentials",
        ));
    }

    let token = match request.grant_type.as_deref() {
        Some("client_credentials") => {
            let scopes = granted_scopes(&state.client, request.scope.as_deref())?;
            let mut details = RestAuthDetails::new(session.id().await);
            if let Some(address) = forwarded_for(&headers) {
                details = details.with_remote_address(address);
            }
            let authentication = Authentication::new(state.client.client_id())
                .with_scopes(scopes)
                .with_details(AuthDetails::Rest(details));
            state
                .token_services
                .create_access_token(&authentication)
                .await?
        }
        Some("refresh_token") => {
            let value = request.refresh_token.as_deref().ok_or_else(|| {
                ServerError::oauth(OAuthErrorCode::InvalidRequest, "missing refresh_token")
            })?;
            let value = TokenValue::from(value);
            ensure_refresh_token_client(&state, &value, client_id).await?;
            state.token_services.refresh_access_token(&value).await?
        }
        Some(other) => {
            return Err(ServerError::oauth(
                OAuthErrorCode::UnsupportedGrantType,
                format!("unsupported grant type: {other}"),
            ));
        }
        None => {
            return Err(ServerError::oauth(
                OAuthErrorCode::InvalidRequest,
                "missing grant_type",
            ));
        }
    };

    session
        .set_attribute(ACCESS_TOKEN_KEY, token.value().as_str())
        .await;
    info!(client_id, grant_type = request.grant_type.as_deref(), "token granted");
    Ok(Json(TokenResponse::from(&token)))
}

/// Returns the caller's session.
pub async fn get_session(auth: Authenticated, session: CurrentSession) -> Json<SessionView> {
    Json(session_view(&auth, &session).await)
}

/// Merges attributes into the caller's session.
///
/// Reserved keys are ignored.
pub async fn update_session(
    auth: Authenticated,
    session: CurrentSession,
    Json(attributes): Json<Map<String, JsonValue>>,
) -> Json<SessionView> {
    for (key, value) in attributes {
        if key != ACCESS_TOKEN_KEY {
            session.set_attribute(key, value).await;
        }
    }
    Json(session_view(&auth, &session).await)
}

/// Ends the caller's session and revokes its access token.
pub async fn logout(_auth: Authenticated, session: CurrentSession) -> StatusCode {
    session.invalidate().await;
    StatusCode::NO_CONTENT
}

async fn session_view(auth: &Authenticated, session: &CurrentSession) -> SessionView {
    let mut attributes = session.data().await.attributes().clone();
    attributes.remove(ACCESS_TOKEN_KEY);
    SessionView {
        session_id: session.id().await,
        principal: auth.authentication.name().to_string(),
        attributes,
    }
}

/// Picks the scopes to grant: everything allowed when none are requested,
/// otherwise the requested scopes if the client may have all of them.
fn granted_scopes(client: &ClientConfig, requested: Option<&str>) -> Result<Vec<Scope>, ServerError> {
    let allowed = client.scopes();
    let requested = requested.map(parse_scope).unwrap_or_default();
    if requested.is_empty() {
        return Ok(allowed);
    }
    if let Some(scope) = requested.iter().find(|s| !allowed.contains(s)) {
        return Err(ServerError::oauth(
            OAuthErrorCode::InvalidScope,
            format!("scope {} is not allowed", scope.as_str()),
        ));
    }
    Ok(requested)
}

/// A refresh token may only be redeemed by the client it was issued to.
async fn ensure_refresh_token_client(
    state: &AppState,
    value: &TokenValue,
    client_id: &str,
) -> Result<(), ServerError> {
    let store = state.token_services.store();
    let Some(refresh) = store.read_refresh_token(value).await? else {
        return Ok(());
    };
    if let Some(authentication) = store.read_authentication_for_refresh_token(&refresh).await? {
        if authentication.client_id().as_str() != client_id {
            return Err(ServerError::oauth(
                OAuthErrorCode::InvalidGrant,
                "refresh token was issued to another client",
            ));
        }
    }
    Ok(())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
