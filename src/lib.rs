pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod utils;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::auth::session::SessionStore;
use crate::auth::{AuthResolver, SqliteCredentialStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub resolver: AuthResolver,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let store = Arc::new(SqliteCredentialStore::new(db.clone()));
        let resolver = AuthResolver::new(store, config.auth.regeneration_interval_secs);
        let sessions = SessionStore::new(db.clone(), config.auth.session_lifetime_hours);
        Self {
            config,
            db,
            resolver,
            sessions,
        }
    }
}
