//! Chunk lookup by id.
//!
//! Used by `retrofit get` and `GET /chunk/{id}`. Ids are surrogate keys
//! reassigned whenever a document is re-indexed, so they are only valid
//! against the index state that produced them.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::ChunkRecord;
use crate::search::OutputFormat;
use crate::store;

/// Fetches one chunk with its document's path, type and folder.
pub async fn get_chunk(config: &Config, chunk_id: i64) -> crate::error::Result<ChunkRecord> {
    let pool = db::open(&config.db.path).await?;
    let record = store::get_chunk(&pool, chunk_id).await;
    pool.close().await;
    record
}

/// CLI entry point: prints the chunk to stdout.
pub async fn run_get(config: &Config, chunk_id: i64, format: OutputFormat) -> Result<()> {
    let record = get_chunk(config, chunk_id).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("--- Chunk {} ---", record.chunk_id);
    println!("path:        {}", record.path);
    println!("doc_type:    {}", record.doc_type);
    if !record.rel_folder.is_empty() {
        println!("folder:      {}", record.rel_folder);
    }
    println!("lines:       {}-{}", record.start_line, record.end_line);
    println!("kind:        {}", record.kind);
    println!("chunk_index: {}", record.chunk_index);
    println!("doc_id:      {}", record.doc_id);
    println!();
    println!("{}", record.text);

    Ok(())
}
