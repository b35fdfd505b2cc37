//! The request and response view seen by session id resolvers.
//!
//! Resolvers never reach into ambient request state. Whatever the web layer
//! knows about the current request is copied into a `RequestContext`, and
//! anything a resolver wants written back goes into a `ResponseContext`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Attributes held by the current web session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
    attributes: Map<String, JsonValue>,
}

impl SessionData {
    /// Creates empty session data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&JsonValue> {
        self.attributes.get(key)
    }

    /// Returns a string attribute; other JSON types read as absent.
    #[must_use]
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Option<JsonValue> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Removes an attribute, returning it.
    pub fn remove_attribute(&mut self, key: &str) -> Option<JsonValue> {
        self.attributes.remove(key)
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Map<String, JsonValue> {
        &self.attributes
    }

    /// Returns true if no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// What a resolver may read from the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    attributes: HashMap<String, String>,
    parameters: HashMap<String, String>,
    headers: HashMap<String, String>,
    session_data: SessionData,
}

impl RequestContext {
    /// Creates an empty request context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a request attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Sets a request parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(name, value);
        self
    }

    /// Sets a request header. Header names are case-insensitive.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Replaces the session data.
    #[must_use]
    pub fn with_session_data(mut self, session_data: SessionData) -> Self {
        self.session_data = session_data;
        self
    }

    /// Sets a request attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Sets a request parameter; the first value of a repeated parameter wins.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .entry(name.into())
            .or_insert_with(|| value.into());
    }

    /// Sets a request header.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Returns a request attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns a request parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Returns a request header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the current session data.
    #[must_use]
    pub fn session_data(&self) -> &SessionData {
        &self.session_data
    }

    /// Returns the current session data for mutation.
    pub fn session_data_mut(&mut self) -> &mut SessionData {
        &mut self.session_data
    }
}

/// What a resolver may write to the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseContext {
    headers: HashMap<String, String>,
}

impl ResponseContext {
    /// Creates an empty response context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a response header, replacing any previous value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Returns a response header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Iterates over the response headers (names lowercased).
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
