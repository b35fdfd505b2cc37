//! Token enhancement.
//!
//! An enhancer takes a freshly issued access token and the authentication
//! it was issued for, and returns the token that is actually handed out.

use crate::authentication::Authentication;
use crate::error::EnhanceError;
use crate::token::{AccessToken, AdditionalInformation};
use bearer_session_core::Result;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::trace;

/// Capability to enrich an access token before it is issued.
pub trait TokenEnhancer: Send + Sync {
    /// Returns the enriched token.
    ///
    /// # Errors
    ///
    /// Returns `EnhanceError` if the enhancer cannot produce a token.
    fn enhance(
        &self,
        token: &AccessToken,
        authentication: &Authentication,
    ) -> Result<AccessToken, EnhanceError>;
}

/// Composite enhancer over an ordered list of enhancers.
///
/// Every enhancer is invoked with the token the chain received, not with
/// the previous enhancer's output, and the last enhancer's result is the
/// one returned. With no enhancers the input token comes back unchanged.
/// The first failing enhancer aborts the chain.
#[derive(Clone, Default)]
pub struct TokenEnhancerChain {
    enhancers: Vec<Arc<dyn TokenEnhancer>>,
}

impl TokenEnhancerChain {
    /// Creates a chain over the given enhancers, in order.
    #[must_use]
    pub fn new(enhancers: Vec<Arc<dyn TokenEnhancer>>) -> Self {
        Self { enhancers }
    }

    /// Appends an enhancer to the end of the chain.
    #[must_use]
    pub fn with(mut self, enhancer: Arc<dyn TokenEnhancer>) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    /// Returns the number of enhancers in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    /// Returns true if the chain has no enhancers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }
}

impl TokenEnhancer for TokenEnhancerChain {
    fn enhance(
        &self,
        token: &AccessToken,
        authentication: &Authentication,
    ) -> Result<AccessToken, EnhanceError> {
        let mut result = token.clone();
        for (position, enhancer) in self.enhancers.iter().enumerate() {
            trace!(position, "applying token enhancer");
            result = enhancer.enhance(token, authentication)?;
        }
        Ok(result)
    }
}

/// Merges a fixed set of entries into the token's additional information.
///
/// Existing entries with the same keys are overwritten.
#[derive(Debug, Clone, Default)]
pub struct AdditionalInformationEnhancer {
    entries: AdditionalInformation,
}

impl AdditionalInformationEnhancer {
    /// Creates an enhancer that adds the given entries.
    #[must_use]
    pub fn new(entries: AdditionalInformation) -> Self {
        Self { entries }
    }

    /// Adds one entry.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl TokenEnhancer for AdditionalInformationEnhancer {
    fn enhance(
        &self,
        token: &AccessToken,
        _authentication: &Authentication,
    ) -> Result<AccessToken, EnhanceError> {
        let mut enhanced = token.clone();
        let info = enhanced.additional_information_mut();
        for (key, value) in &self.entries {
            info.insert(key.clone(), value.clone());
        }
        Ok(enhanced)
    }
}

/// Records who the token was issued to.
///
/// Writes the authentication's name (user principal, or client id for
/// client-only grants) under a configurable key.
#[derive(Debug, Clone)]
pub struct PrincipalEnhancer {
    key: String,
}

impl PrincipalEnhancer {
    /// Default key the principal is written under.
    pub const DEFAULT_KEY: &'static str = "principal";

    /// Creates an enhancer writing under `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for PrincipalEnhancer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEY)
    }
}

impl TokenEnhancer for PrincipalEnhancer {
    fn enhance(
        &self,
        token: &AccessToken,
        authentication: &Authentication,
    ) -> Result<AccessToken, EnhanceError> {
        if self.key.is_empty() {
            return Err(EnhanceError::Failed {
                enhancer: "principal".to_string(),
                reason: "empty additional-information key".to_string(),
            }
            .into());
        }
        let mut enhanced = token.clone();
        enhanced.additional_information_mut().insert(
            self.key.clone(),
            JsonValue::String(authentication.name().to_string()),
        );
        Ok(enhanced)
    }
}
