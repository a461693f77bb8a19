//! SQLite connection handling.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::Result;
use crate::migrate;

/// Opens a pool on the store file at `path`, creating the file and its
/// parent directory when missing.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// [`connect`] followed by idempotent schema creation.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    let pool = connect(path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(pool)
}
