//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for inventory, history, category config,
//! form content rows and photo metadata. A generic `kv` table holds the
//! serialized blobs (form templates, options, mail templates, presence map,
//! photo events, mileages, durable bootstrap snapshot) behind explicit
//! repository methods.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            category TEXT NOT NULL,
            name TEXT PRIMARY KEY,
            last_control TEXT NOT NULL DEFAULT '',
            next_control TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'green',
            last_verifier TEXT NOT NULL DEFAULT '',
            next_item_name TEXT NOT NULL DEFAULT '',
            next_item_expiry TEXT NOT NULL DEFAULT '',
            mail_orange TEXT NOT NULL DEFAULT '',
            mail_red TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT 'Actif',
            location TEXT NOT NULL DEFAULT '',
            display_order INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            logged_at TEXT NOT NULL,
            bag_name TEXT NOT NULL,
            verifier TEXT NOT NULL DEFAULT '',
            details TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            name TEXT PRIMARY KEY,
            frequency_days INTEGER NOT NULL DEFAULT 30,
            seq INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT NOT NULL,
            section TEXT NOT NULL,
            item TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL DEFAULT 'text',
            def_value TEXT NOT NULL DEFAULT '',
            position TEXT NOT NULL DEFAULT ''
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            family TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            bag_name TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            file_name TEXT NOT NULL,
            taken_at INTEGER NOT NULL,
            trashed INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_inventory_category ON inventory(category);
        CREATE INDEX IF NOT EXISTS idx_history_bag_name ON history(bag_name);
        CREATE INDEX IF NOT EXISTS idx_form_rows_category ON form_rows(category);
        CREATE INDEX IF NOT EXISTS idx_photos_bag_name ON photos(bag_name);
        CREATE INDEX IF NOT EXISTS idx_photos_family ON photos(family);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
