use sqlx::FromRow;

/// Raw session row as stored in SQLite. Timestamps are RFC 3339 strings;
/// parsing into [`chrono`] types happens in the session store.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub logged_in: i64,
    pub login_time: Option<String>,
    pub last_regeneration: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}
