//! Persistence for documents, chunks and the full-text index.
//!
//! Every write path runs inside one transaction per document, so a failure
//! while replacing one file's chunks never leaves that file half-written
//! and never touches any other file's committed rows.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkRecord, Document, SearchHit};
use crate::search::score_from_rank;

/// Content hash recorded for `doc_id`, if the document was indexed before.
pub async fn stored_hash(pool: &SqlitePool, doc_id: &str) -> Result<Option<String>> {
    let hash: Option<String> = sqlx::query_scalar("SELECT sha256 FROM documents WHERE id = ?")
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
    Ok(hash)
}

/// Replaces a document and its whole chunk set.
///
/// Upserts the document row, deletes its old chunks and FTS rows, then
/// inserts the new ones. Chunk ids are reassigned on every replace.
pub async fn write_document(
    pool: &SqlitePool,
    doc: &Document,
    chunks: &[Chunk],
    mtime: i64,
    sha256: &str,
) -> Result<()> {
    let meta_json = serde_json::to_string(&doc.meta)?;
    let indexed_at = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, path, rel_folder, doc_type, mtime, sha256, meta_json, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            rel_folder = excluded.rel_folder,
            doc_type = excluded.doc_type,
            mtime = excluded.mtime,
            sha256 = excluded.sha256,
            meta_json = excluded.meta_json,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&doc.doc_id)
    .bind(&doc.path)
    .bind(&doc.rel_folder)
    .bind(doc.doc_type.as_str())
    .bind(mtime)
    .bind(sha256)
    .bind(&meta_json)
    .bind(indexed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM chunks_fts WHERE doc_id = ?")
        .bind(&doc.doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(&doc.doc_id)
        .execute(&mut *tx)
        .await?;

    for chunk in chunks {
        let chunk_meta = serde_json::to_string(&chunk.meta)?;
        let chunk_id = sqlx::query(
            r#"
            INSERT INTO chunks (doc_id, chunk_index, start_line, end_line, text, kind, meta_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.doc_id)
        .bind(chunk.chunk_index as i64)
        .bind(chunk.start_line as i64)
        .bind(chunk.end_line as i64)
        .bind(&chunk.text)
        .bind(chunk.kind.as_str())
        .bind(&chunk_meta)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO chunks_fts (text, chunk_id, doc_id, path, doc_type, rel_folder)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.text)
        .bind(chunk_id)
        .bind(&doc.doc_id)
        .bind(&doc.path)
        .bind(doc.doc_type.as_str())
        .bind(&doc.rel_folder)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Filters and limits for [`search_fts`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilter<'a> {
    pub doc_type: Option<&'a str>,
    /// Folder prefix relative to the indexing root, `/`-separated.
    pub scope: Option<&'a str>,
}

/// Runs an already-sanitised FTS5 `MATCH` expression.
///
/// Hits are ordered by `bm25` ascending (best first) and cut at `top_k`.
/// `scope` matches the folder itself and everything below it.
pub async fn search_fts(
    pool: &SqlitePool,
    match_expr: &str,
    top_k: i64,
    filter: &SearchFilter<'_>,
    snippet_tokens: i64,
) -> Result<Vec<SearchHit>> {
    let rows = sqlx::query(
        r#"
        SELECT chunk_id, path, doc_type, rel_folder,
               bm25(chunks_fts) AS rank,
               snippet(chunks_fts, 0, '<<<', '>>>', ' … ', ?) AS snip
        FROM chunks_fts
        WHERE chunks_fts MATCH ?
          AND (? IS NULL OR doc_type = ?)
          AND (? IS NULL OR rel_folder = ? OR substr(rel_folder, 1, length(?) + 1) = ? || '/')
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(snippet_tokens)
    .bind(match_expr)
    .bind(filter.doc_type)
    .bind(filter.doc_type)
    .bind(filter.scope)
    .bind(filter.scope)
    .bind(filter.scope)
    .bind(filter.scope)
    .bind(top_k)
    .fetch_all(pool)
    .await?;

    let hits = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            SearchHit {
                chunk_id: row.get("chunk_id"),
                path: row.get("path"),
                doc_type: row.get("doc_type"),
                rel_folder: row.get("rel_folder"),
                rank,
                score: score_from_rank(rank),
                snippet: row.get("snip"),
            }
        })
        .collect();

    Ok(hits)
}

/// One chunk joined with its document. Fails with
/// [`Error::ChunkNotFound`] for an unknown id.
pub async fn get_chunk(pool: &SqlitePool, chunk_id: i64) -> Result<ChunkRecord> {
    let row = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.doc_id, c.chunk_index, c.start_line, c.end_line,
               c.kind, c.text, d.path, d.doc_type, d.rel_folder
        FROM chunks c
        JOIN documents d ON d.id = c.doc_id
        WHERE c.id = ?
        "#,
    )
    .bind(chunk_id)
    .fetch_optional(pool)
    .await?
    .ok_or(Error::ChunkNotFound(chunk_id))?;

    Ok(chunk_record(&row))
}

/// Deletes documents stored under `root_prefix` whose file is gone from
/// disk, with their chunks and FTS rows. Returns how many were removed.
///
/// `seen` holds the paths the walk indexed or tried to; anything else is
/// checked on disk, so a file that is merely filtered out (extension,
/// exclude glob, unreadable directory) keeps its document.
///
/// `root_prefix` must end with the platform path separator so that a root
/// of `/src` does not claim `/src2`.
pub async fn prune_missing(
    pool: &SqlitePool,
    root_prefix: &str,
    seen: &HashSet<String>,
) -> Result<u64> {
    let rows = sqlx::query("SELECT id, path FROM documents WHERE substr(path, 1, length(?)) = ?")
        .bind(root_prefix)
        .bind(root_prefix)
        .fetch_all(pool)
        .await?;

    let stale: Vec<(String, String)> = rows
        .iter()
        .map(|row| (row.get::<String, _>("id"), row.get::<String, _>("path")))
        .filter(|(_, path)| !seen.contains(path) && !Path::new(path).exists())
        .collect();

    for (doc_id, path) in &stale {
        delete_document(pool, doc_id).await?;
        tracing::info!(path = %path, "pruned missing document");
    }

    Ok(stale.len() as u64)
}

/// Removes one document with its chunks and FTS rows.
pub async fn delete_document(pool: &SqlitePool, doc_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunks_fts WHERE doc_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Chunk rows of one document in order, for inspection and tests.
pub async fn document_chunks(pool: &SqlitePool, doc_id: &str) -> Result<Vec<ChunkRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.doc_id, c.chunk_index, c.start_line, c.end_line,
               c.kind, c.text, d.path, d.doc_type, d.rel_folder
        FROM chunks c
        JOIN documents d ON d.id = c.doc_id
        WHERE c.doc_id = ?
        ORDER BY c.chunk_index
        "#,
    )
    .bind(doc_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(chunk_record).collect())
}

fn chunk_record(row: &SqliteRow) -> ChunkRecord {
    ChunkRecord {
        chunk_id: row.get("chunk_id"),
        doc_id: row.get("doc_id"),
        chunk_index: row.get("chunk_index"),
        start_line: row.get("start_line"),
        end_line: row.get("end_line"),
        kind: row.get("kind"),
        text: row.get("text"),
        path: row.get("path"),
        doc_type: row.get("doc_type"),
        rel_folder: row.get("rel_folder"),
    }
}
