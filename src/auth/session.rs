//! Per-request session context and its SQLite backing.
//!
//! A [`Session`] is an explicit, mutable value handed to the resolver
//! rather than ambient state. The store persists it keyed by the session
//! cookie value; rotating the ID replaces the row.

use chrono::{DateTime, Duration, Utc};

use super::{generate_token, AuthError, AuthedUser};
use crate::db::{DbPool, SessionRow, User};

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    user_id: Option<String>,
    user_name: Option<String>,
    user_email: Option<String>,
    logged_in: bool,
    login_time: Option<DateTime<Utc>>,
    last_regeneration: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    /// ID this session was stored under before rotation, so the old row
    /// can be removed on save.
    previous_id: Option<String>,
    dirty: bool,
}

impl Session {
    /// Fresh anonymous session. Not persisted until something writes to it.
    pub fn new() -> Self {
        Self {
            id: generate_token(),
            user_id: None,
            user_name: None,
            user_email: None,
            logged_in: false,
            login_time: None,
            last_regeneration: None,
            created_at: Utc::now(),
            previous_id: None,
            dirty: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    pub fn login_time(&self) -> Option<DateTime<Utc>> {
        self.login_time
    }

    pub fn is_authenticated(&self) -> bool {
        self.logged_in && self.user_id.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Identity as seen by handlers. Name and email fall back to
    /// placeholders when the session predates those fields.
    pub fn identity(&self) -> AuthedUser {
        AuthedUser {
            id: self.user_id.clone().unwrap_or_default(),
            name: self
                .user_name
                .clone()
                .unwrap_or_else(|| "User".to_string()),
            email: self.user_email.clone().unwrap_or_default(),
        }
    }

    /// Overwrite the session identity with `user` and force a rotation.
    pub fn sign_in(&mut self, user: &User, now: DateTime<Utc>) {
        self.user_id = Some(user.id.clone());
        self.user_name = Some(user.name.clone());
        self.user_email = Some(user.email.clone());
        self.logged_in = true;
        self.login_time = Some(now);
        self.rotate(now);
    }

    /// Update the cached identity fields after a profile edit.
    pub fn update_identity(&mut self, name: &str, email: &str) {
        self.user_name = Some(name.to_string());
        self.user_email = Some(email.to_string());
        self.dirty = true;
    }

    /// Rotate the session ID if `interval` has elapsed since the last
    /// rotation. Sessions that never rotated count as overdue.
    pub fn rotate_if_due(&mut self, interval: Duration, now: DateTime<Utc>) {
        let due = match self.last_regeneration {
            Some(last) => now - last >= interval,
            None => true,
        };
        if due {
            self.rotate(now);
        }
    }

    fn rotate(&mut self, now: DateTime<Utc>) {
        if self.previous_id.is_none() {
            self.previous_id = Some(self.id.clone());
        }
        self.id = generate_token();
        self.last_regeneration = Some(now);
        self.dirty = true;
    }

    #[cfg(test)]
    pub fn set_user_id_for_test(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        self.logged_in = true;
        self.last_regeneration = Some(Utc::now());
    }

    fn from_row(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_email: row.user_email,
            logged_in: row.logged_in != 0,
            login_time: row.login_time.as_deref().and_then(parse_ts),
            last_regeneration: row.last_regeneration.as_deref().and_then(parse_ts),
            created_at: parse_ts(&row.created_at).unwrap_or_else(Utc::now),
            previous_id: None,
            dirty: false,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// SQLite-backed session persistence.
#[derive(Clone)]
pub struct SessionStore {
    pool: DbPool,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(pool: DbPool, lifetime_hours: i64) -> Self {
        Self {
            pool,
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    /// Load a non-expired session by cookie value.
    pub async fn load(&self, id: &str) -> Result<Option<Session>, AuthError> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions WHERE id = ? AND expires_at > ?")
                .bind(id)
                .bind(Utc::now().to_rfc3339())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Session::from_row))
    }

    /// Persist the session, replacing the pre-rotation row when the ID
    /// changed. Clears the dirty flag.
    pub async fn save(&self, session: &mut Session) -> Result<(), AuthError> {
        if let Some(old_id) = session.previous_id.take() {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(&old_id)
                .execute(&self.pool)
                .await?;
        }
        let expires_at = (Utc::now() + self.lifetime).to_rfc3339();
        sqlx::query(
            "INSERT OR REPLACE INTO sessions \
             (id, user_id, user_name, user_email, logged_in, login_time, last_regeneration, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.user_name)
        .bind(&session.user_email)
        .bind(session.logged_in as i64)
        .bind(session.login_time.map(|t| t.to_rfc3339()))
        .bind(session.last_regeneration.map(|t| t.to_rfc3339()))
        .bind(session.created_at.to_rfc3339())
        .bind(&expires_at)
        .execute(&self.pool)
        .await?;
        session.dirty = false;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
