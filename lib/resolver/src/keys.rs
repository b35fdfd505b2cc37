//! Reserved attribute, parameter and metadata keys.

/// Request attribute holding the bearer token value, set by the
/// authentication layer once the `Authorization` header has been accepted.
pub const ACCESS_TOKEN_VALUE_ATTRIBUTE: &str = "OAuth2AuthenticationDetails.ACCESS_TOKEN_VALUE";

/// Additional-information key the bound session id is stored under.
pub const SESSION_ID_KEY: &str = "OAuth2AccessTokenSessionIdResolver.SESSION_ID";

/// Session-data key for an access token value issued during the current
/// request, before any request attribute can carry it.
pub const ACCESS_TOKEN_KEY: &str = "OAuth2AccessTokenSessionIdResolver.ACCESS_TOKEN";

/// Request parameter naming the OAuth2 grant.
pub const GRANT_TYPE_PARAM: &str = "grant_type";

/// Request parameter carrying the refresh token value.
pub const REFRESH_TOKEN_PARAM: &str = "refresh_token";

/// `grant_type` value of the refresh grant.
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";
