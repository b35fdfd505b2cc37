//! Server error types and their HTTP mapping.
//!
//! Token endpoint failures render as RFC 6749 error bodies. Failures of
//! the token store or session machinery are logged and masked as 500.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bearer_session_oauth::{TokenServiceError, TokenStoreError};
use rootcause::Report;
use serde::Serialize;
use std::fmt;

/// OAuth2 error codes returned by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    UnsupportedGrantType,
}

impl OAuthErrorCode {
    /// Returns the wire value of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            Self::InvalidClient => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Errors surfaced by handlers and middleware.
#[derive(Debug)]
pub enum ServerError {
    /// A bearer token was presented but is unknown or expired.
    InvalidToken,
    /// The route requires a bearer token and none was presented.
    Unauthenticated,
    /// The token endpoint rejected the request.
    OAuth {
        code: OAuthErrorCode,
        description: String,
    },
    /// The request could not be read.
    BadRequest { reason: String },
    /// An internal collaborator failed.
    Internal { details: String },
}

impl ServerError {
    /// Creates a token endpoint error.
    #[must_use]
    pub fn oauth(code: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self::OAuth {
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken => write!(f, "invalid bearer token"),
            Self::Unauthenticated => write!(f, "bearer token required"),
            Self::OAuth { code, description } => {
                write!(f, "{}: {}", code.as_str(), description)
            }
            Self::BadRequest { reason } => write!(f, "bad request: {reason}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<Report<TokenStoreError>> for ServerError {
    fn from(report: Report<TokenStoreError>) -> Self {
        Self::Internal {
            details: report.to_string(),
        }
    }
}

impl From<Report<TokenServiceError>> for ServerError {
    fn from(report: Report<TokenServiceError>) -> Self {
        if report.current_context().is_invalid_grant() {
            Self::oauth(
                OAuthErrorCode::InvalidGrant,
                report.current_context().to_string(),
            )
        } else {
            Self::Internal {
                details: report.to_string(),
            }
        }
    }
}

#[derive(Serialize)]
struct OAuthErrorBody<'a> {
    error: &'a str,
    error_description: &'a str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, r#"Bearer error="invalid_token""#)],
                "Invalid token",
            )
                .into_response(),
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                "Authentication required",
            )
                .into_response(),
            Self::OAuth { code, description } => (
                code.status(),
                Json(OAuthErrorBody {
                    error: code.as_str(),
                    error_description: &description,
                }),
            )
                .into_response(),
            Self::BadRequest { reason } => (StatusCode::BAD_REQUEST, reason).into_response(),
            Self::Internal { details } => {
                tracing::error!(error = %details, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
