//! Error types for the oauth crate.
//!
//! Errors are reported through rootcause:
//! - `TokenStoreError`: failures of the token persistence layer
//! - `EnhanceError`: failures inside a token enhancer
//! - `TokenServiceError`: failures issuing or refreshing tokens

use std::fmt;

/// Errors from token store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStoreError {
    /// The backing store could not be reached.
    Unavailable { reason: String },
}

impl fmt::Display for TokenStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "token store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for TokenStoreError {}

/// Errors raised by a token enhancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhanceError {
    /// The named enhancer could not enrich the token.
    Failed { enhancer: String, reason: String },
}

impl fmt::Display for EnhanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { enhancer, reason } => {
                write!(f, "token enhancer '{enhancer}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for EnhanceError {}

/// Errors from issuing, refreshing or revoking tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenServiceError {
    /// The refresh token is unknown.
    InvalidRefreshToken { value: String },
    /// The refresh token has expired.
    RefreshTokenExpired { value: String },
    /// No authentication is recorded for the refresh token.
    MissingAuthentication { value: String },
    /// The token store failed.
    Store,
    /// The token enhancer failed.
    Enhance,
    /// A configured token validity is not a usable number of seconds.
    InvalidValidity { setting: &'static str },
}

impl fmt::Display for TokenServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRefreshToken { value } => write!(f, "invalid refresh token: {value}"),
            Self::RefreshTokenExpired { value } => write!(f, "refresh token expired: {value}"),
            Self::MissingAuthentication { value } => {
                write!(f, "no authentication recorded for refresh token: {value}")
            }
            Self::Store => write!(f, "token store operation failed"),
            Self::Enhance => write!(f, "token enhancement failed"),
            Self::InvalidValidity { setting } => {
                write!(f, "{setting} is outside the supported range")
            }
        }
    }
}

impl std::error::Error for TokenServiceError {}

impl TokenServiceError {
    /// Returns true if the error is the client's fault (bad or stale grant).
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        matches!(
            self,
            Self::InvalidRefreshToken { .. }
                | Self::RefreshTokenExpired { .. }
                | Self::MissingAuthentication { .. }
        )
    }
}
