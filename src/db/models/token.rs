//! Credential rows consumed by the auth resolver.

use serde::Serialize;
use sqlx::FromRow;

/// A non-expired remember-me candidate. The plaintext cookie value is
/// verified against `token_hash`; it is never stored.
#[derive(Debug, Clone, FromRow)]
pub struct RememberTokenRow {
    pub user_id: String,
    pub token_hash: String,
}

/// A matched API token row. The token itself is opaque and matched
/// exactly in SQL, so only the owner comes back.
#[derive(Debug, Clone, FromRow)]
pub struct ApiTokenRow {
    pub user_id: String,
}

/// Full API token record for the management endpoints. The token value
/// is only ever returned once, at creation time.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub name: String,
    pub created_at: String,
    pub expires_at: String,
}
