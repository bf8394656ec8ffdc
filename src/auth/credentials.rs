//! Credential extraction from the inbound request.
//!
//! Pulls the remember-me cookie, the bearer token, and the query-string
//! token out of the request up front, so the resolver works on plain
//! optionals instead of HTTP types.

use axum::http::{HeaderMap, Uri};
use axum_extra::extract::CookieJar;

use crate::config::AuthConfig;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub remember_token: Option<String>,
    pub bearer_token: Option<String>,
    pub query_token: Option<String>,
}

impl Credentials {
    pub fn from_request(headers: &HeaderMap, uri: &Uri, jar: &CookieJar, config: &AuthConfig) -> Self {
        Self {
            remember_token: jar
                .get(&config.remember_cookie)
                .map(|c| c.value().to_string()),
            bearer_token: bearer_token(headers),
            query_token: query_token(uri.query(), &config.token_param),
        }
    }

    /// The API token to use for the bearer tier: header wins, query
    /// parameter is the fallback.
    pub fn api_token(&self) -> Option<&str> {
        self.bearer_token
            .as_deref()
            .or(self.query_token.as_deref())
    }
}

/// Extract a token from `Authorization: Bearer <token>`. Any other
/// scheme counts as no token, not as an error.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Find `param=value` in the raw query string (for clients that cannot
/// set headers, like EventSource).
pub fn query_token(query: Option<&str>, param: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        if key == param && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
