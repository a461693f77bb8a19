//! Index statistics.
//!
//! A quick summary of what is indexed: document and chunk counts, split by
//! document type, plus the time of the most recent indexing write.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::search::OutputFormat;

#[derive(Debug, Clone, Serialize)]
pub struct TypeStats {
    pub doc_type: String,
    pub documents: i64,
    pub chunks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub by_type: Vec<TypeStats>,
    pub last_indexed_at: Option<i64>,
}

pub async fn collect(pool: &SqlitePool) -> crate::error::Result<IndexStats> {
    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    let last_indexed_at: Option<i64> = sqlx::query_scalar("SELECT MAX(indexed_at) FROM documents")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT d.doc_type,
               COUNT(DISTINCT d.id) AS doc_count,
               COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.doc_id = d.id
        GROUP BY d.doc_type
        ORDER BY doc_count DESC, d.doc_type
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_type = rows
        .iter()
        .map(|row| TypeStats {
            doc_type: row.get("doc_type"),
            documents: row.get("doc_count"),
            chunks: row.get("chunk_count"),
        })
        .collect();

    Ok(IndexStats {
        documents,
        chunks,
        by_type,
        last_indexed_at,
    })
}

/// CLI entry point for `retrofit stats`.
pub async fn run_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let pool = db::open(&config.db.path).await?;
    let stats = collect(&pool).await?;
    pool.close().await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Retrofit index");
    println!("==============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Last index:  {}",
        stats
            .last_indexed_at
            .map(format_ts)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.by_type.is_empty() {
        println!();
        println!("  {:<10} {:>8} {:>8}", "TYPE", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(28));
        for t in &stats.by_type {
            println!("  {:<10} {:>8} {:>8}", t.doc_type, t.documents, t.chunks);
        }
    }
    println!();

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn test_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::open(&dir.path().join("s.sqlite")).await.unwrap();
        let stats = collect(&pool).await.unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
        assert!(stats.by_type.is_empty());
        assert_eq!(stats.last_indexed_at, None);
    }
}
