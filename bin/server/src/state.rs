//! Shared application state.

use bearer_session_oauth::{
    AdditionalInformation, AdditionalInformationEnhancer, InMemoryTokenStore, PrincipalEnhancer,
    TokenEnhancer, TokenEnhancerChain, TokenServices,
};
use bearer_session_resolver::{
    AccessTokenSessionIdResolver, HeaderSessionIdResolver, HttpSessionIdResolver,
};
use config::ConfigError;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::config::{ClientConfig, ResolverKind, ServerConfig};
use crate::session::SessionRepository;

/// State shared by every request.
pub struct AppState {
    /// Token issuance over the token store.
    pub token_services: TokenServices,
    /// Maps requests to session ids.
    pub resolver: Arc<dyn HttpSessionIdResolver>,
    /// Web sessions.
    pub sessions: SessionRepository,
    /// The registered OAuth2 client.
    pub client: ClientConfig,
    token_store: Arc<InMemoryTokenStore>,
}

impl AppState {
    /// Builds the state from configuration.
    ///
    /// The enhancer chain writes the principal, followed by the configured
    /// token information when there is any. The chain keeps only the last
    /// enhancer's output, so configured token information replaces the
    /// principal entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: &ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let token_store = Arc::new(InMemoryTokenStore::new());
        let mut enhancers: Vec<Arc<dyn TokenEnhancer>> =
            vec![Arc::new(PrincipalEnhancer::default())];
        if !config.token_information.is_empty() {
            let entries: AdditionalInformation = config
                .token_information
                .iter()
                .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
                .collect();
            enhancers.push(Arc::new(AdditionalInformationEnhancer::new(entries)));
        }
        let token_services = TokenServices::new(token_store.clone(), config.token.clone())
            .with_enhancer(Arc::new(TokenEnhancerChain::new(enhancers)));

        let resolver: Arc<dyn HttpSessionIdResolver> = match config.session.resolver {
            ResolverKind::AccessToken => {
                Arc::new(AccessTokenSessionIdResolver::new(token_store.clone()))
            }
            ResolverKind::Header => Arc::new(HeaderSessionIdResolver::x_auth_token()),
        };

        Ok(Self {
            token_services,
            resolver,
            sessions: SessionRepository::new(config.session.max_inactive()?),
            client: config.client.clone(),
            token_store,
        })
    }

    /// Drops expired sessions and tokens.
    ///
    /// Returns the number of sessions and tokens removed.
    pub async fn cleanup(&self) -> (usize, usize) {
        let sessions = self.sessions.delete_expired().await;
        let tokens = self.token_store.purge_expired().await;
        (sessions, tokens)
    }
}
