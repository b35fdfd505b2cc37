//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables prefixed with
//! `BEARER_SESSION`, using `__` to separate nested keys
//! (e.g. `BEARER_SESSION__CLIENT__SECRET`).
//!
//! See [`TokenServicesConfig`] for token lifetime settings.

use bearer_session_oauth::TokenServicesConfig;
use chrono::Duration;
use config::ConfigError;
use oauth2::{ClientId, Scope};
use serde::Deserialize;
use std::collections::HashMap;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Token lifetime configuration.
    #[serde(default)]
    pub token: TokenServicesConfig,

    /// The OAuth2 client allowed to use the token endpoint.
    pub client: ClientConfig,

    /// Fixed entries added to the additional information of every issued
    /// access token.
    #[serde(default)]
    pub token_information: HashMap<String, String>,
}

/// Which strategy maps requests to sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Session id stored on the OAuth2 access token.
    #[default]
    AccessToken,
    /// Session id carried in the `X-Auth-Token` header.
    Header,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is discarded, in seconds.
    #[serde(default = "default_max_inactive_seconds")]
    pub max_inactive_seconds: i64,

    /// Interval between session and token cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Session id resolution strategy.
    #[serde(default)]
    pub resolver: ResolverKind,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_inactive_seconds() -> i64 {
    1800
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl SessionConfig {
    /// Returns the idle timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a positive number of seconds
    /// within [`TokenServicesConfig::MAX_VALIDITY_SECONDS`].
    pub fn max_inactive(&self) -> Result<Duration, ConfigError> {
        lifetime("session.max_inactive_seconds", self.max_inactive_seconds)
    }
}

fn lifetime(setting: &str, seconds: i64) -> Result<Duration, ConfigError> {
    if !(1..=TokenServicesConfig::MAX_VALIDITY_SECONDS).contains(&seconds) {
        return Err(ConfigError::Message(format!(
            "{setting} must be between 1 and {} seconds, got {seconds}",
            TokenServicesConfig::MAX_VALIDITY_SECONDS
        )));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| ConfigError::Message(format!("{setting} is out of range")))
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inactive_seconds: default_max_inactive_seconds(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            resolver: ResolverKind::default(),
        }
    }
}

/// A registered OAuth2 client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Client identifier.
    pub id: String,

    /// Client secret, compared verbatim.
    pub secret: String,

    /// Space-delimited scopes the client may be granted.
    #[serde(default)]
    pub scope: String,
}

impl ClientConfig {
    /// Returns the client id.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        ClientId::new(self.id.clone())
    }

    /// Returns the allowed scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<Scope> {
        parse_scope(&self.scope)
    }

    /// Returns true if the credentials match this client.
    #[must_use]
    pub fn authenticates(&self, client_id: &str, client_secret: &str) -> bool {
        self.id == client_id && self.secret == client_secret
    }
}

/// Splits a space-delimited OAuth2 scope string.
#[must_use]
pub fn parse_scope(scope: &str) -> Vec<Scope> {
    scope
        .split_whitespace()
        .map(|s| Scope::new(s.to_string()))
        .collect()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("BEARER_SESSION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the lifetimes and intervals the server turns into durations.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first setting out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        lifetime(
            "token.access_token_validity_seconds",
            self.token.access_token_validity_seconds,
        )?;
        if self.token.support_refresh_token {
            lifetime(
                "token.refresh_token_validity_seconds",
                self.token.refresh_token_validity_seconds,
            )?;
        }
        self.session.max_inactive()?;
        if self.session.cleanup_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "session.cleanup_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
