//! Token issuance, refresh and revocation.

use crate::authentication::Authentication;
use crate::enhancer::TokenEnhancer;
use crate::error::TokenServiceError;
use crate::store::TokenStore;
use crate::token::{AccessToken, RefreshToken};
use bearer_session_core::{Result, TokenValue};
use chrono::Duration;
use rootcause::prelude::ResultExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Token lifetime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenServicesConfig {
    /// Access token validity in seconds.
    #[serde(default = "default_access_token_validity_seconds")]
    pub access_token_validity_seconds: i64,

    /// Refresh token validity in seconds.
    #[serde(default = "default_refresh_token_validity_seconds")]
    pub refresh_token_validity_seconds: i64,

    /// Whether refresh tokens are issued at all.
    #[serde(default = "default_support_refresh_token")]
    pub support_refresh_token: bool,
}

fn default_access_token_validity_seconds() -> i64 {
    43_200
}

fn default_refresh_token_validity_seconds() -> i64 {
    31_536_000
}

fn default_support_refresh_token() -> bool {
    true
}

impl TokenServicesConfig {
    /// Longest accepted token validity: one hundred years.
    pub const MAX_VALIDITY_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

    /// Returns the access token validity, or `None` if it is not a positive
    /// number of seconds within [`Self::MAX_VALIDITY_SECONDS`].
    #[must_use]
    pub fn access_token_validity(&self) -> Option<Duration> {
        validity(self.access_token_validity_seconds)
    }

    /// Returns the refresh token validity, under the same bounds as
    /// [`Self::access_token_validity`].
    #[must_use]
    pub fn refresh_token_validity(&self) -> Option<Duration> {
        validity(self.refresh_token_validity_seconds)
    }
}

fn validity(seconds: i64) -> Option<Duration> {
    if (1..=TokenServicesConfig::MAX_VALIDITY_SECONDS).contains(&seconds) {
        Duration::try_seconds(seconds)
    } else {
        None
    }
}

impl Default for TokenServicesConfig {
    fn default() -> Self {
        Self {
            access_token_validity_seconds: default_access_token_validity_seconds(),
            refresh_token_validity_seconds: default_refresh_token_validity_seconds(),
            support_refresh_token: default_support_refresh_token(),
        }
    }
}

/// Issues tokens into a token store.
#[derive(Clone)]
pub struct TokenServices {
    store: Arc<dyn TokenStore>,
    enhancer: Option<Arc<dyn TokenEnhancer>>,
    config: TokenServicesConfig,
}

impl TokenServices {
    /// Creates token services over a store.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, config: TokenServicesConfig) -> Self {
        Self {
            store,
            enhancer: None,
            config,
        }
    }

    /// Sets the enhancer applied to every issued access token.
    #[must_use]
    pub fn with_enhancer(mut self, enhancer: Arc<dyn TokenEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Issues a new access token (and refresh token, if enabled).
    #[instrument(skip_all, fields(client_id = %authentication.client_id().as_str()))]
    pub async fn create_access_token(
        &self,
        authentication: &Authentication,
    ) -> Result<AccessToken, TokenServiceError> {
        let refresh_token = if self.config.support_refresh_token {
            let validity = self.config.refresh_token_validity().ok_or(
                TokenServiceError::InvalidValidity {
                    setting: "refresh_token_validity_seconds",
                },
            )?;
            let refresh = RefreshToken::expiring(TokenValue::generate(), validity);
            self.store
                .store_refresh_token(&refresh, authentication)
                .await
                .context(TokenServiceError::Store)?;
            Some(refresh)
        } else {
            None
        };

        let token = self.issue(authentication, refresh_token).await?;
        info!("access token issued");
        Ok(token)
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The access token previously issued with the refresh token is removed;
    /// the refresh token itself is reused.
    #[instrument(skip_all)]
    pub async fn refresh_access_token(
        &self,
        refresh_value: &TokenValue,
    ) -> Result<AccessToken, TokenServiceError> {
        let refresh = self
            .store
            .read_refresh_token(refresh_value)
            .await
            .context(TokenServiceError::Store)?
            .ok_or_else(|| TokenServiceError::InvalidRefreshToken {
                value: refresh_value.to_string(),
            })?;

        if refresh.is_expired() {
            self.store
                .remove_refresh_token(&refresh)
                .await
                .context(TokenServiceError::Store)?;
            return Err(TokenServiceError::RefreshTokenExpired {
                value: refresh_value.to_string(),
            }
            .into());
        }

        let authentication = self
            .store
            .read_authentication_for_refresh_token(&refresh)
            .await
            .context(TokenServiceError::Store)?
            .ok_or_else(|| TokenServiceError::MissingAuthentication {
                value: refresh_value.to_string(),
            })?;

        self.store
            .remove_access_token_using_refresh_token(&refresh)
            .await
            .context(TokenServiceError::Store)?;

        let token = self.issue(&authentication, Some(refresh)).await?;
        info!(client_id = %authentication.client_id().as_str(), "access token refreshed");
        Ok(token)
    }

    /// Revokes an access token and the refresh token issued with it.
    ///
    /// Returns false if the token is unknown.
    #[instrument(skip_all)]
    pub async fn revoke_token(&self, value: &TokenValue) -> Result<bool, TokenServiceError> {
        let Some(token) = self
            .store
            .read_access_token(value)
            .await
            .context(TokenServiceError::Store)?
        else {
            return Ok(false);
        };

        if let Some(refresh) = token.refresh_token() {
            self.store
                .remove_refresh_token(refresh)
                .await
                .context(TokenServiceError::Store)?;
        }
        self.store
            .remove_access_token(&token)
            .await
            .context(TokenServiceError::Store)?;
        debug!("token revoked");
        Ok(true)
    }

    async fn issue(
        &self,
        authentication: &Authentication,
        refresh_token: Option<RefreshToken>,
    ) -> Result<AccessToken, TokenServiceError> {
        let validity = self.config.access_token_validity().ok_or(
            TokenServiceError::InvalidValidity {
                setting: "access_token_validity_seconds",
            },
        )?;
        let mut token = AccessToken::new(TokenValue::generate())
            .with_validity(validity)
            .with_scope(authentication.scopes().to_vec());
        if let Some(refresh) = refresh_token {
            token = token.with_refresh_token(refresh);
        }

        if let Some(enhancer) = &self.enhancer {
            token = enhancer
                .enhance(&token, authentication)
                .context(TokenServiceError::Enhance)?;
        }

        self.store
            .store_access_token(&token, authentication)
            .await
            .context(TokenServiceError::Store)?;
        Ok(token)
    }
}
