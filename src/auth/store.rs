//! Credential store contract and its SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{verify_password, AuthError};
use crate::db::{ApiTokenRow, DbPool, RememberTokenRow, User};

/// The narrow read contract the resolver needs. Expiry is enforced in
/// the queries, not by callers filtering in memory.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All remember-token candidates with `expires_at > now`, in store
    /// iteration order.
    async fn remember_tokens(&self, now: DateTime<Utc>) -> Result<Vec<RememberTokenRow>, AuthError>;

    /// Exact-match lookup of a non-expired API token.
    async fn api_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiTokenRow>, AuthError>;

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, AuthError>;

    /// One-way verification of a plaintext remember-me value against a
    /// stored hash.
    fn verify_token(&self, plaintext: &str, token_hash: &str) -> bool;
}

pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn remember_tokens(&self, now: DateTime<Utc>) -> Result<Vec<RememberTokenRow>, AuthError> {
        let rows: Vec<RememberTokenRow> =
            sqlx::query_as("SELECT user_id, token_hash FROM remember_tokens WHERE expires_at > ?")
                .bind(now.to_rfc3339())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn api_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiTokenRow>, AuthError> {
        let row: Option<ApiTokenRow> =
            sqlx::query_as("SELECT user_id FROM api_tokens WHERE token = ? AND expires_at > ?")
                .bind(token)
                .bind(now.to_rfc3339())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, AuthError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    fn verify_token(&self, plaintext: &str, token_hash: &str) -> bool {
        verify_password(plaintext, token_hash)
    }
}
