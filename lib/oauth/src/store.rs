//! Token persistence.
//!
//! `TokenStore` is the collaborator the session resolver and the token
//! services are written against. `InMemoryTokenStore` is the reference
//! implementation used by the server and in tests.

use crate::authentication::Authentication;
use crate::error::TokenStoreError;
use crate::token::{AccessToken, RefreshToken};
use async_trait::async_trait;
use bearer_session_core::{Result, TokenValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for token storage.
///
/// Lookups of unknown values return `Ok(None)`; errors are reserved for
/// failures of the store itself.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Reads an access token by value.
    async fn read_access_token(
        &self,
        value: &TokenValue,
    ) -> Result<Option<AccessToken>, TokenStoreError>;

    /// Reads the authentication an access token was issued for.
    async fn read_authentication(
        &self,
        token: &AccessToken,
    ) -> Result<Option<Authentication>, TokenStoreError>;

    /// Stores an access token together with its authentication.
    ///
    /// Storing a token whose value already exists replaces it.
    async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &Authentication,
    ) -> Result<(), TokenStoreError>;

    /// Removes an access token and everything keyed by it.
    async fn remove_access_token(&self, token: &AccessToken) -> Result<(), TokenStoreError>;

    /// Reads a refresh token by value.
    async fn read_refresh_token(
        &self,
        value: &TokenValue,
    ) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// Reads the authentication a refresh token was issued for.
    async fn read_authentication_for_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<Authentication>, TokenStoreError>;

    /// Stores a refresh token together with its authentication.
    async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &Authentication,
    ) -> Result<(), TokenStoreError>;

    /// Removes a refresh token and its authentication.
    async fn remove_refresh_token(&self, token: &RefreshToken) -> Result<(), TokenStoreError>;

    /// Removes the access token that was issued alongside a refresh token.
    async fn remove_access_token_using_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<(), TokenStoreError>;
}

#[derive(Default)]
struct Maps {
    access_tokens: HashMap<TokenValue, AccessToken>,
    authentication_by_access: HashMap<TokenValue, Authentication>,
    refresh_tokens: HashMap<TokenValue, RefreshToken>,
    authentication_by_refresh: HashMap<TokenValue, Authentication>,
    access_to_refresh: HashMap<TokenValue, TokenValue>,
    refresh_to_access: HashMap<TokenValue, TokenValue>,
}

/// Token store kept entirely in process memory.
///
/// Each call is atomic with respect to other calls; sequences of calls are
/// not. Tokens are returned as stored, expired or not.
#[derive(Default)]
pub struct InMemoryTokenStore {
    maps: RwLock<Maps>,
    access_token_writes: AtomicU64,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times `store_access_token` has been called.
    #[must_use]
    pub fn access_token_writes(&self) -> u64 {
        self.access_token_writes.load(Ordering::Relaxed)
    }

    /// Returns the number of stored access tokens.
    pub async fn access_token_count(&self) -> usize {
        self.maps.read().await.access_tokens.len()
    }

    /// Returns the number of stored refresh tokens.
    pub async fn refresh_token_count(&self) -> usize {
        self.maps.read().await.refresh_tokens.len()
    }

    /// Drops every expired access and refresh token, returning how many
    /// tokens were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut maps = self.maps.write().await;
        let expired_access: Vec<TokenValue> = maps
            .access_tokens
            .values()
            .filter(|t| t.is_expired())
            .map(|t| t.value().clone())
            .collect();
        let expired_refresh: Vec<TokenValue> = maps
            .refresh_tokens
            .values()
            .filter(|t| t.is_expired())
            .map(|t| t.value().clone())
            .collect();
        for value in &expired_access {
            maps.remove_access(value);
        }
        for value in &expired_refresh {
            maps.remove_refresh(value);
        }
        expired_access.len() + expired_refresh.len()
    }
}

impl Maps {
    fn remove_access(&mut self, value: &TokenValue) {
        self.access_tokens.remove(value);
        self.authentication_by_access.remove(value);
        if let Some(refresh) = self.access_to_refresh.remove(value) {
            self.refresh_to_access.remove(&refresh);
        }
    }

    fn remove_refresh(&mut self, value: &TokenValue) {
        self.refresh_tokens.remove(value);
        self.authentication_by_refresh.remove(value);
        if let Some(access) = self.refresh_to_access.remove(value) {
            self.access_to_refresh.remove(&access);
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn read_access_token(
        &self,
        value: &TokenValue,
    ) -> Result<Option<AccessToken>, TokenStoreError> {
        Ok(self.maps.read().await.access_tokens.get(value).cloned())
    }

    async fn read_authentication(
        &self,
        token: &AccessToken,
    ) -> Result<Option<Authentication>, TokenStoreError> {
        Ok(self
            .maps
            .read()
            .await
            .authentication_by_access
            .get(token.value())
            .cloned())
    }

    async fn store_access_token(
        &self,
        token: &AccessToken,
        authentication: &Authentication,
    ) -> Result<(), TokenStoreError> {
        let mut maps = self.maps.write().await;
        let value = token.value().clone();
        if let Some(refresh) = token.refresh_token() {
            maps.access_to_refresh
                .insert(value.clone(), refresh.value().clone());
            maps.refresh_to_access
                .insert(refresh.value().clone(), value.clone());
        }
        maps.authentication_by_access
            .insert(value.clone(), authentication.clone());
        maps.access_tokens.insert(value, token.clone());
        self.access_token_writes.fetch_add(1, Ordering::Relaxed);
        debug!(client_id = %authentication.client_id().as_str(), "access token stored");
        Ok(())
    }

    async fn remove_access_token(&self, token: &AccessToken) -> Result<(), TokenStoreError> {
        self.maps.write().await.remove_access(token.value());
        debug!("access token removed");
        Ok(())
    }

    async fn read_refresh_token(
        &self,
        value: &TokenValue,
    ) -> Result<Option<RefreshToken>, TokenStoreError> {
        Ok(self.maps.read().await.refresh_tokens.get(value).cloned())
    }

    async fn read_authentication_for_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<Option<Authentication>, TokenStoreError> {
        Ok(self
            .maps
            .read()
            .await
            .authentication_by_refresh
            .get(token.value())
            .cloned())
    }

    async fn store_refresh_token(
        &self,
        token: &RefreshToken,
        authentication: &Authentication,
    ) -> Result<(), TokenStoreError> {
        let mut maps = self.maps.write().await;
        maps.authentication_by_refresh
            .insert(token.value().clone(), authentication.clone());
        maps.refresh_tokens
            .insert(token.value().clone(), token.clone());
        Ok(())
    }

    async fn remove_refresh_token(&self, token: &RefreshToken) -> Result<(), TokenStoreError> {
        self.maps.write().await.remove_refresh(token.value());
        Ok(())
    }

    async fn remove_access_token_using_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<(), TokenStoreError> {
        let mut maps = self.maps.write().await;
        if let Some(access) = maps.refresh_to_access.get(token.value()).cloned() {
            maps.remove_access(&access);
        }
        Ok(())
    }
}
