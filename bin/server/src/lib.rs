//! bearer-session HTTP server.
//!
//! Issues OAuth2 access tokens and keeps a web session per token. The
//! session follows the token across refreshes and ends when the session is
//! invalidated, which also revokes the token.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let session_routes = Router::new()
        .route("/oauth/token", post(routes::token))
        .route(
            "/api/session",
            get(routes::get_session).post(routes::update_session),
        )
        .route("/api/logout", post(routes::logout))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_filter,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(session_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
