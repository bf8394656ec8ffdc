//! API-token management for the logged-in user. The plaintext token is
//! only returned once, at creation.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{generate_token, AuthedUser};
use crate::db::ApiToken;
use crate::AppState;

use super::error::ApiError;

pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<Vec<ApiToken>>, ApiError> {
    let tokens: Vec<ApiToken> = sqlx::query_as(
        "SELECT * FROM api_tokens WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(tokens))
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    #[serde(default = "default_expiry_days")]
    pub expires_in_days: i64,
}

fn default_expiry_days() -> i64 {
    90
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub success: bool,
    pub id: String,
    pub token: String,
    pub expires_at: String,
}

pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("Token name is required"));
    }
    if request.expires_in_days < 1 {
        return Err(ApiError::bad_request("Expiry must be at least one day"));
    }

    let id = Uuid::new_v4().to_string();
    let token = generate_token();
    let now = Utc::now();
    let expires_at = (now + chrono::Duration::days(request.expires_in_days)).to_rfc3339();

    sqlx::query(
        "INSERT INTO api_tokens (id, user_id, token, name, created_at, expires_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&token)
    .bind(request.name.trim())
    .bind(now.to_rfc3339())
    .bind(&expires_at)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %user.id, token_id = %id, "API token created");
    Ok(Json(CreateTokenResponse {
        success: true,
        id,
        token,
        expires_at,
    }))
}

pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM api_tokens WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Token not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
