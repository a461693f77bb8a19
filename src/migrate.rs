//! Idempotent schema creation.
//!
//! `documents` holds one row per indexed file, `chunks` one row per chunk,
//! and `chunks_fts` is the FTS5 index over chunk text. The FTS rows carry
//! `path`, `doc_type` and `rel_folder` so ranked search filters and
//! describes hits without joining back to `documents`.

use sqlx::SqlitePool;

use crate::error::{Error, Result};

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            rel_folder TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            mtime INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            meta_json TEXT NOT NULL DEFAULT '{}',
            indexed_at INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY,
            doc_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            text TEXT NOT NULL,
            kind TEXT NOT NULL,
            meta_json TEXT NOT NULL DEFAULT '{}',
            FOREIGN KEY (doc_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // created once; a SQLite build without FTS5 fails here
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                text,
                chunk_id UNINDEXED,
                doc_id UNINDEXED,
                path UNINDEXED,
                doc_type UNINDEXED,
                rel_folder UNINDEXED
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(fts_unavailable)?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id, chunk_index)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_type_folder ON documents(doc_type, rel_folder)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Maps a missing FTS5 module to [`Error::SearchUnavailable`].
fn fts_unavailable(err: sqlx::Error) -> Error {
    let msg = err.to_string().to_lowercase();
    if msg.contains("no such module") || msg.contains("fts5") {
        Error::SearchUnavailable(err.to_string())
    } else {
        Error::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_errors_stay_database_errors() {
        let err = fts_unavailable(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_missing_module_is_search_unavailable() {
        let err = fts_unavailable(sqlx::Error::Protocol("no such module: fts5".into()));
        assert!(matches!(err, Error::SearchUnavailable(_)));
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::connect(&dir.path().join("t.sqlite")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('documents', 'chunks', 'chunks_fts')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 3);
    }
}
