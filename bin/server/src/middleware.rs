//! Session filter and request extractors for Axum.
//!
//! The session filter wraps every session-aware route. On the way in it
//! validates any bearer token, builds a [`RequestContext`] and restores the
//! session the configured resolver points at. On the way out it commits the
//! session and lets the resolver bind it to the client, or expires it when a
//! handler invalidated it.

use axum::{
    Form,
    body::{Body, Bytes, to_bytes},
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header, request::Parts},
    middleware::Next,
    response::Response,
};
use bearer_session_core::{SessionId, TokenValue};
use bearer_session_oauth::{AccessToken, Authentication};
use bearer_session_resolver::{
    ACCESS_TOKEN_VALUE_ATTRIBUTE, RequestContext, ResponseContext, SessionData,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::ServerError;
use crate::session::Session;
use crate::state::AppState;

/// Largest form body the filter buffers to read parameters.
const MAX_FORM_BYTES: usize = 64 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The caller authenticated by a bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: AccessToken,
    pub authentication: Authentication,
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authenticated>()
            .cloned()
            .ok_or(ServerError::Unauthenticated)
    }
}

struct SessionState {
    session: Session,
    invalidated: bool,
}

/// The web session of the current request.
///
/// Handlers mutate the session through this handle; the session filter
/// commits it once the handler returns.
#[derive(Clone)]
pub struct CurrentSession {
    inner: Arc<Mutex<SessionState>>,
}

impl CurrentSession {
    fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                session,
                invalidated: false,
            })),
        }
    }

    /// Returns the session id.
    pub async fn id(&self) -> SessionId {
        self.inner.lock().await.session.id().clone()
    }

    /// Returns a copy of the session attributes.
    pub async fn data(&self) -> SessionData {
        self.inner.lock().await.session.data().clone()
    }

    /// Sets a session attribute.
    pub async fn set_attribute(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.inner
            .lock()
            .await
            .session
            .data_mut()
            .set_attribute(key, value);
    }

    /// Marks the session for expiry when the request completes.
    pub async fn invalidate(&self) {
        self.inner.lock().await.invalidated = true;
    }

    async fn snapshot(&self) -> (Session, bool) {
        let state = self.inner.lock().await;
        (state.session.clone(), state.invalidated)
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| ServerError::Internal {
                details: "session filter is not installed".to_string(),
            })
    }
}

/// Restores, commits and expires web sessions around a request.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn session_filter(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let (mut parts, body) = request.into_parts();
    let mut context = request_context(&parts);

    for (name, value) in query_parameters(&parts.uri) {
        context.set_parameter(name, value);
    }

    let body = if is_form(&parts.headers) {
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|e| ServerError::BadRequest {
                reason: format!("unreadable form body: {e}"),
            })?;
        for (name, value) in form_parameters(bytes.clone()).await {
            context.set_parameter(name, value);
        }
        Body::from(bytes)
    } else {
        body
    };

    if let Some(value) = bearer_token(&parts.headers) {
        let store = state.token_services.store();
        let token = store
            .read_access_token(&TokenValue::from(value))
            .await?
            .filter(|token| !token.is_expired())
            .ok_or(ServerError::InvalidToken)?;
        let authentication = store
            .read_authentication(&token)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        context.set_attribute(ACCESS_TOKEN_VALUE_ATTRIBUTE, token.value().as_str());
        parts.extensions.insert(Authenticated {
            token,
            authentication,
        });
    }

    let mut restored = None;
    for id in state.resolver.resolve_session_ids(&context).await? {
        if let Some(session) = state.sessions.find_by_id(&id).await {
            restored = Some(session);
            break;
        }
    }
    let is_new = restored.is_none();
    let session = restored.unwrap_or_else(|| {
        debug!("starting new session");
        Session::new()
    });

    let current = CurrentSession::new(session);
    parts.extensions.insert(current.clone());

    let mut response = next.run(Request::from_parts(parts, body)).await;

    let (session, invalidated) = current.snapshot().await;
    let context = context.with_session_data(session.data().clone());
    let mut outgoing = ResponseContext::new();

    if invalidated {
        state.resolver.expire_session(&context, &mut outgoing).await?;
        state.sessions.delete(session.id()).await;
        debug!(session_id = %session.id(), "session expired");
    } else if is_new && !response.status().is_success() {
        debug!("discarding new session of failed request");
    } else {
        let session_id = session.id().clone();
        state.sessions.save(session).await;
        state
            .resolver
            .set_session_id(&context, &mut outgoing, &session_id)
            .await?;
    }

    apply_headers(&outgoing, response.headers_mut());
    Ok(response)
}

fn request_context(parts: &Parts) -> RequestContext {
    let mut context = RequestContext::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            context.set_header(name.as_str(), value);
        }
    }
    context
}

/// Decodes the query string; a malformed query yields no parameters.
fn query_parameters(uri: &Uri) -> Vec<(String, String)> {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default()
}

/// Decodes a buffered form body; a malformed body yields no parameters and
/// is left for the handler's own extractor to reject.
async fn form_parameters(bytes: Bytes) -> Vec<(String, String)> {
    let mut request = Request::new(Body::from(bytes));
    *request.method_mut() = Method::POST;
    request.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(FORM_CONTENT_TYPE),
    );
    Form::<Vec<(String, String)>>::from_request(request, &())
        .await
        .map(|Form(pairs)| pairs)
        .unwrap_or_default()
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(FORM_CONTENT_TYPE))
}

/// Extracts the token from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn apply_headers(outgoing: &ResponseContext, headers: &mut HeaderMap) {
    for (name, value) in outgoing.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok_1"));
        assert_eq!(bearer_token(&headers), Some("tok_1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  tok_2 "));
        assert_eq!(bearer_token(&headers), Some("tok_2"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn query_parameters_are_decoded() {
        let uri: Uri = "/oauth/token?grant_type=refresh_token&refresh_token=tok_01H%2Fx&scope=rest-api+read"
            .parse()
            .unwrap();
        assert_eq!(
            query_parameters(&uri),
            pairs(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", "tok_01H/x"),
                ("scope", "rest-api read"),
            ])
        );

        let bare: Uri = "/api/session".parse().unwrap();
        assert!(query_parameters(&bare).is_empty());
    }

    #[tokio::test]
    async fn form_parameters_keep_repeated_names_in_order() {
        let body = Bytes::from_static(b"grant_type=refresh_token&grant_type=password&x=");
        assert_eq!(
            form_parameters(body).await,
            pairs(&[
                ("grant_type", "refresh_token"),
                ("grant_type", "password"),
                ("x", ""),
            ])
        );
    }

    #[test]
    fn form_detection_ignores_charset() {
        let mut headers = HeaderMap::new();
        assert!(!is_form(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        assert!(is_form(&headers));
    }

    #[test]
    fn invalid_response_headers_are_dropped() {
        let mut outgoing = ResponseContext::new();
        outgoing.set_header("X-Auth-Token", "sess_1");
        outgoing.set_header("bad header", "x");

        let mut headers = HeaderMap::new();
        apply_headers(&outgoing, &mut headers);

        assert_eq!(headers.get("x-auth-token").map(|v| v.as_bytes()), Some(&b"sess_1"[..]));
        assert_eq!(headers.len(), 1);
    }

    #[tokio::test]
    async fn current_session_tracks_mutations() {
        let current = CurrentSession::new(Session::new());
        current.set_attribute("locale", "en").await;
        current.invalidate().await;

        let (session, invalidated) = current.snapshot().await;
        assert!(invalidated);
        assert_eq!(session.data().str_attribute("locale"), Some("en"));
        assert_eq!(current.data().await.str_attribute("locale"), Some("en"));
    }
}
