mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqliteConnection, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(&mut *conn).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("gatehouse.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Settle PRAGMAs and the schema on a single connection so no other
    // pool connection caches a pre-migration schema (sqlx-sqlite panics
    // on a `SELECT *` whose column count changed under a cached plan).
    let mut conn = pool.acquire().await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // Run migrations
    run_migrations(&mut conn).await?;
    drop(conn);

    info!("Database initialized successfully");
    Ok(pool)
}

async fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Initial schema
    execute_sql(conn, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Add profile_pic column for avatar uploads
    let has_profile_pic: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM pragma_table_info('users') WHERE name = 'profile_pic'",
    )
    .fetch_optional(&mut *conn)
    .await?;
    if has_profile_pic.is_none() {
        execute_sql(conn, include_str!("../../migrations/002_profile_pic.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}
