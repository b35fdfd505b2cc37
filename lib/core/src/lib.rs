//! Core types shared by the bearer-session crates.
//!
//! This crate provides the identifier newtypes used to bind web sessions
//! to OAuth2 tokens, and the `Result` alias every other crate builds its
//! error handling on.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{SessionId, TokenValue};
