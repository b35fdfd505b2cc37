//! OAuth2 token model and collaborators for bearer-session.
//!
//! This crate provides:
//! - Access and refresh tokens (`AccessToken`, `RefreshToken`)
//! - The authentication a token was issued for (`Authentication`, `AuthDetails`)
//! - Token persistence (`TokenStore`, `InMemoryTokenStore`)
//! - Token enrichment (`TokenEnhancer`, `TokenEnhancerChain`)
//! - Token issuance and refresh (`TokenServices`)
//!
//! # Example
//!
//! ```
//! use bearer_session_oauth::{
//!     AccessToken, Authentication, InMemoryTokenStore, TokenStore,
//! };
//! use bearer_session_core::TokenValue;
//! use oauth2::ClientId;
//!
//! # tokio_test_runtime(async {
//! let store = InMemoryTokenStore::new();
//! let token = AccessToken::new("tok-1");
//! let authentication = Authentication::new(ClientId::new("web-client".to_string()));
//!
//! store.store_access_token(&token, &authentication).await.unwrap();
//! let found = store.read_access_token(&TokenValue::from("tok-1")).await.unwrap();
//! assert_eq!(found.map(|t| t.value().clone()), Some(token.value().clone()));
//! # });
//! # fn tokio_test_runtime(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod authentication;
pub mod enhancer;
pub mod error;
pub mod services;
pub mod store;
pub mod token;

// Re-export main types at crate root
pub use authentication::{AuthDetails, Authentication, RestAuthDetails};
pub use enhancer::{
    AdditionalInformationEnhancer, PrincipalEnhancer, TokenEnhancer, TokenEnhancerChain,
};
pub use error::{EnhanceError, TokenServiceError, TokenStoreError};
pub use services::{TokenServices, TokenServicesConfig};
pub use store::{InMemoryTokenStore, TokenStore};
pub use token::{AccessToken, AdditionalInformation, BEARER_TYPE, RefreshToken};
