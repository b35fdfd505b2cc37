//! Session id resolution for bearer-token clients.
//!
//! REST clients do not carry session cookies. This crate binds the web
//! session to the OAuth2 access token instead: the session id is stored in
//! the token's additional information, and any request presenting the token
//! is routed back to the same session.
//!
//! This crate provides:
//! - The request/response view resolvers work on (`RequestContext`,
//!   `ResponseContext`, `SessionData`)
//! - The resolver abstraction (`HttpSessionIdResolver`)
//! - A token-backed resolver (`AccessTokenSessionIdResolver`)
//! - A header-backed resolver (`HeaderSessionIdResolver`)

pub mod header;
pub mod keys;
pub mod request;
pub mod resolver;

pub use header::HeaderSessionIdResolver;
pub use keys::{
    ACCESS_TOKEN_KEY, ACCESS_TOKEN_VALUE_ATTRIBUTE, GRANT_TYPE_PARAM, REFRESH_TOKEN_GRANT,
    REFRESH_TOKEN_PARAM, SESSION_ID_KEY,
};
pub use request::{RequestContext, ResponseContext, SessionData};
pub use resolver::{AccessTokenSessionIdResolver, HttpSessionIdResolver};
