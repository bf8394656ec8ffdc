//! Login, logout, the read-only auth probe, and the middleware that
//! runs the resolver chain for protected routes.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{
    generate_token, hash_password, verify_password, AuthOutcome, Credentials, Session,
};
use crate::config::AuthConfig;
use crate::db::{DbPool, LoginRequest, LoginResponse, User};
use crate::AppState;

use super::error::ApiError;

/// ID of the request's live session, for handlers that write identity
/// fields back after a profile change.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub String);

fn session_cookie(config: &AuthConfig, id: &str) -> Cookie<'static> {
    Cookie::build((config.session_cookie.clone(), id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn remember_cookie(config: &AuthConfig, token: &str) -> Cookie<'static> {
    Cookie::build((config.remember_cookie.clone(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(config.remember_lifetime_days))
        .build()
}

fn removal_cookie(name: String) -> Cookie<'static> {
    let mut cookie = Cookie::from(name);
    cookie.set_path("/");
    cookie
}

/// Load the session referenced by the cookie, or start a fresh
/// anonymous one.
async fn load_session(state: &AppState, jar: &CookieJar) -> Result<Session, ApiError> {
    if let Some(cookie) = jar.get(&state.config.auth.session_cookie) {
        if let Some(session) = state.sessions.load(cookie.value()).await? {
            return Ok(session);
        }
    }
    Ok(Session::new())
}

/// Middleware guarding protected routes. Runs the resolver chain and
/// either forwards the request with the identity attached or answers
/// 401 with the standard envelope. Store faults become 5xx, not 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let creds = Credentials::from_request(
        request.headers(),
        request.uri(),
        &jar,
        &state.config.auth,
    );
    let mut session = load_session(&state, &jar).await?;

    match state.resolver.resolve(&mut session, &creds).await? {
        AuthOutcome::Authenticated { user, method } => {
            if session.is_dirty() {
                state.sessions.save(&mut session).await?;
            }
            tracing::debug!(user_id = %user.id, ?method, "request authenticated");
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(method);
            request
                .extensions_mut()
                .insert(CurrentSession(session.id().to_string()));
            // refresh the cookie so a rotated ID reaches the client
            let jar = jar.add(session_cookie(&state.config.auth, session.id()));
            let response = next.run(request).await;
            Ok((jar, response).into_response())
        }
        AuthOutcome::Unauthenticated => Err(ApiError::unauthorized("Authentication required")),
    }
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let mut session = Session::new();
    session.sign_in(&user, Utc::now());
    state.sessions.save(&mut session).await?;

    let mut jar = jar.add(session_cookie(&state.config.auth, session.id()));

    if request.remember {
        let token = mint_remember_token(
            &state.db,
            &user.id,
            state.config.auth.remember_lifetime_days,
        )
        .await?;
        jar = jar.add(remember_cookie(&state.config.auth, &token));
    }

    tracing::info!(user_id = %user.id, "user logged in");
    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            user: user.into(),
        }),
    ))
}

/// Create a remember-me credential: random plaintext for the cookie,
/// Argon2 hash for the row.
async fn mint_remember_token(
    pool: &DbPool,
    user_id: &str,
    lifetime_days: i64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_password(&token).map_err(|e| {
        tracing::error!("Failed to hash remember token: {}", e);
        ApiError::internal("Failed to create remember token")
    })?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO remember_tokens (id, user_id, token_hash, created_at, expires_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&token_hash)
    .bind(now.to_rfc3339())
    .bind((now + chrono::Duration::days(lifetime_days)).to_rfc3339())
    .execute(pool)
    .await?;
    Ok(token)
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Logout endpoint: drops the session row and clears both cookies.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutResponse>), ApiError> {
    if let Some(cookie) = jar.get(&state.config.auth.session_cookie) {
        state.sessions.delete(cookie.value()).await?;
    }
    let jar = jar
        .remove(removal_cookie(state.config.auth.session_cookie.clone()))
        .remove(removal_cookie(state.config.auth.remember_cookie.clone()));
    Ok((jar, Json(LogoutResponse { success: true })))
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub authenticated: bool,
}

/// Read-only probe: answers whether the request would authenticate,
/// without touching the session or rotating its ID.
pub async fn check(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<CheckResponse>, ApiError> {
    let creds = Credentials::from_request(&headers, &uri, &jar, &state.config.auth);
    let session = load_session(&state, &jar).await?;
    let authenticated = state.resolver.check(&session, &creds).await?;
    Ok(Json(CheckResponse { authenticated }))
}

/// Seed an admin account on first start so the instance is usable.
pub async fn ensure_admin_user(pool: &DbPool, email: &str, password: &str) -> anyhow::Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("failed to hash admin password: {e}"))?;
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(email)
    .bind(&password_hash)
    .bind("Admin")
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Created admin user: {}", email);
    Ok(())
}
