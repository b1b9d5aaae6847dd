//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date on
//! every start. All statements are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets page reads proceed while a submission is being written
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema_version_table(&pool).await?;
    create_events_table(&pool).await?;
    create_verification_codes_table(&pool).await?;
    create_guestbook_entries_table(&pool).await?;
    create_contributions_table(&pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&pool)
        .await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Event reference data, written by the event-management tooling
async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('wedding', 'funeral')),
            title TEXT NOT NULL,
            side_a_host TEXT NOT NULL DEFAULT '',
            side_b_host TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Verification codes
///
/// Timestamps are epoch milliseconds so expiry is a plain integer compare.
/// `attempts_count` is recorded on every failed verify but not enforced.
async fn create_verification_codes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone TEXT NOT NULL,
            code_hash TEXT NOT NULL,
            issued_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            is_verified INTEGER NOT NULL DEFAULT 0,
            attempts_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_codes_phone ON verification_codes (phone, is_verified)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guestbook_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guestbook_entries (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            phone TEXT NOT NULL,
            name TEXT NOT NULL,
            message TEXT NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 1,
            is_verified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One verified guestbook entry per (event, phone)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_guestbook_verified_phone
        ON guestbook_entries (event_id, phone) WHERE is_verified = 1
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_contributions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributions (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            phone TEXT NOT NULL,
            name TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            relationship TEXT NOT NULL,
            side TEXT NOT NULL CHECK (side IN ('a', 'b')),
            is_verified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One verified contribution per (event, phone)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_contribution_verified_phone
        ON contributions (event_id, phone) WHERE is_verified = 1
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
