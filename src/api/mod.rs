pub mod auth;
mod error;
mod profile;
mod tokens;

pub use error::ApiError;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/check", get(auth::check));

    // Protected API routes
    let api_routes = Router::new()
        // Profile (raised body limit so the avatar cap check answers
        // oversized uploads, not the framework default)
        .route(
            "/profile",
            get(profile::get_profile)
                .post(profile::update_profile)
                .layer(DefaultBodyLimit::max(profile::BODY_LIMIT)),
        )
        // API tokens
        .route("/tokens", get(tokens::list_tokens))
        .route("/tokens", post(tokens::create_token))
        .route("/tokens/:id", delete(tokens::delete_token))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
