//! Profile endpoints backing the frontend's edit-profile modal.
//!
//! The update endpoint takes `multipart/form-data` with `name`, `email`
//! and an optional `profile_pic` file, and answers the
//! `{success, user}` envelope the modal expects.

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::auth::AuthedUser;
use crate::db::User;
use crate::AppState;

use super::auth::CurrentSession;
use super::error::ApiError;

const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Body ceiling for the profile form route. Well above the avatar cap
/// plus the text fields, so oversized uploads reach the handler's own
/// size check and get its message instead of a framework reject.
pub(crate) const BODY_LIMIT: usize = 2 * MAX_AVATAR_BYTES;

#[derive(Debug, Serialize)]
pub struct ProfileUser {
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: ProfileUser,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            success: true,
            user: ProfileUser {
                name: user.name,
                email: user.email,
                profile_pic: user.profile_pic,
            },
        }
    }
}

/// Current user's profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let row: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(row.into()))
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if trimmed.len() > 100 {
        return Err(ApiError::bad_request("Name must be 100 characters or less"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

/// Trim both text fields before validation so stray whitespace never
/// reaches the UNIQUE email column.
fn normalized_fields(name: String, email: String) -> Result<(String, String), ApiError> {
    let name = name.trim().to_string();
    let email = email.trim().to_string();
    validate_name(&name)?;
    validate_email(&email)?;
    Ok((name, email))
}

/// Pick a safe storage extension from the uploaded filename.
fn image_extension(filename: &str) -> Result<String, ApiError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ApiError::bad_request(
            "Profile picture must be a PNG, JPEG, GIF or WebP image",
        ))
    }
}

/// Update the current user's profile from a multipart form.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthedUser>,
    Extension(session): Extension<CurrentSession>,
    mut multipart: Multipart,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut name: Option<String> = None;
    let mut email: Option<String> = None;
    let mut avatar: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form data: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::bad_request("Invalid name field"))?,
                );
            }
            "email" => {
                email = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| ApiError::bad_request("Invalid email field"))?,
                );
            }
            "profile_pic" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::bad_request("Invalid profile picture upload"))?;
                if bytes.len() > MAX_AVATAR_BYTES {
                    return Err(ApiError::bad_request("Profile picture must be 5 MB or less"));
                }
                if !bytes.is_empty() {
                    avatar = Some((filename, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let email = email.ok_or_else(|| ApiError::bad_request("Email is required"))?;
    let (name, email) = normalized_fields(name, email)?;

    let mut profile_pic: Option<String> = None;
    if let Some((filename, bytes)) = avatar {
        let ext = image_extension(&filename)?;
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let uploads = state.config.server.data_dir.join("uploads");
        crate::utils::ensure_dir(&uploads).map_err(|e| {
            tracing::error!("Failed to create uploads directory: {:#}", e);
            ApiError::internal("Failed to store profile picture")
        })?;
        tokio::fs::write(uploads.join(&stored_name), &bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to write profile picture: {}", e);
                ApiError::internal("Failed to store profile picture")
            })?;
        profile_pic = Some(format!("/uploads/{stored_name}"));
    }

    let now = Utc::now().to_rfc3339();
    if let Some(pic) = &profile_pic {
        sqlx::query("UPDATE users SET name = ?, email = ?, profile_pic = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(&email)
            .bind(pic)
            .bind(&now)
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    } else {
        sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(&email)
            .bind(&now)
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }

    // keep the live session's identity in step with the edit
    sqlx::query("UPDATE sessions SET user_name = ?, user_email = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(&session.0)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "profile updated");

    let row: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(row.into()))
}
