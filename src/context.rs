//! Context assembly: ranked hits packed into one citation-annotated string.
//!
//! Each hit becomes a piece:
//!
//! ```text
//! [n] /abs/path/file.com (dcl) lines 12-40
//! <chunk text>
//! ```
//!
//! Pieces are appended in rank order and joined by a blank line. Assembly
//! stops at the first piece that would push the string past
//! `max_context_chars` (separators included); that piece and every later
//! one are left out whole, never truncated. Lengths are counted in chars.

use anyhow::Result as AnyResult;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, Citation, SearchHit};
use crate::search::{self, OutputFormat, SearchOptions};

const SEPARATOR: &str = "\n\n";

/// The assembled context with the hits it was drawn from.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPack {
    pub context: String,
    /// Every hit the search returned, including ones left out of `context`.
    pub hits: Vec<SearchHit>,
    /// One per piece in `context`; `citations[n - 1]` is piece `[n]`.
    pub citations: Vec<Citation>,
    /// Chunk records behind `citations`, same order.
    #[serde(skip)]
    pub chunks: Vec<ChunkRecord>,
}

/// Header line of piece `n`.
pub fn piece_header(n: usize, record: &ChunkRecord) -> String {
    format!(
        "[{}] {} ({}) lines {}-{}",
        n, record.path, record.doc_type, record.start_line, record.end_line
    )
}

/// Packs `records` (already in rank order) under `max_chars`.
pub fn pack(records: Vec<ChunkRecord>, max_chars: usize) -> (String, Vec<ChunkRecord>) {
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = Vec::new();

    for record in records {
        let piece = format!("{}\n{}", piece_header(included.len() + 1, &record), record.text);
        let sep = if included.is_empty() { 0 } else { SEPARATOR.len() };
        let len = piece.chars().count() + sep;
        if used + len > max_chars {
            break;
        }
        if sep > 0 {
            context.push_str(SEPARATOR);
        }
        context.push_str(&piece);
        used += len;
        included.push(record);
    }

    (context, included)
}

/// Searches, fetches chunk bodies and packs them.
pub async fn build_context(
    pool: &SqlitePool,
    question: &str,
    opts: &SearchOptions,
    max_context_chars: usize,
) -> Result<ContextPack> {
    let hits = search::search(pool, question, opts).await?;

    let mut records = Vec::with_capacity(hits.len());
    for hit in &hits {
        match crate::store::get_chunk(pool, hit.chunk_id).await {
            Ok(record) => records.push(record),
            Err(Error::ChunkNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    let (context, chunks) = pack(records, max_context_chars);
    let citations = chunks
        .iter()
        .map(|r| Citation {
            path: r.path.clone(),
            start_line: r.start_line,
            end_line: r.end_line,
            doc_type: r.doc_type.clone(),
        })
        .collect();

    Ok(ContextPack {
        context,
        hits,
        citations,
        chunks,
    })
}

/// Prints a pack for `retrofit explain --mode context`.
pub fn print_pack(question: &str, pack: &ContextPack, format: OutputFormat) -> AnyResult<()> {
    if format == OutputFormat::Json {
        let body = serde_json::json!({
            "question": question,
            "mode": "context",
            "context": pack.context,
            "hits": pack.hits,
            "citations": pack.citations,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    if pack.context.is_empty() {
        println!("No context found.");
        return Ok(());
    }
    println!("{}", pack.context);
    println!();
    print_citations(&pack.citations);
    Ok(())
}

pub fn print_citations(citations: &[Citation]) {
    println!("Citations:");
    for (i, c) in citations.iter().enumerate() {
        println!(
            "  [{}] {} ({}) lines {}-{}",
            i + 1,
            c.path,
            c.doc_type,
            c.start_line,
            c.end_line
        );
    }
}

/// CLI helper: opens the store and builds a pack with config defaults
/// already folded into `opts`.
pub async fn build_context_for(
    config: &Config,
    question: &str,
    opts: &SearchOptions,
    max_context_chars: usize,
) -> Result<ContextPack> {
    let pool = db::open(&config.db.path).await?;
    let pack = build_context(&pool, question, opts, max_context_chars).await;
    pool.close().await;
    pack
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id,
            doc_id: "d".to_string(),
            chunk_index: id,
            start_line: 1,
            end_line: 3,
            kind: "block".to_string(),
            text: text.to_string(),
            path: "/r/a.txt".to_string(),
            doc_type: "text".to_string(),
            rel_folder: String::new(),
        }
    }

    #[test]
    fn test_pack_format() {
        let (context, included) = pack(vec![record(1, "one"), record(2, "two")], 10_000);
        assert_eq!(
            context,
            "[1] /r/a.txt (text) lines 1-3\none\n\n[2] /r/a.txt (text) lines 1-3\ntwo"
        );
        assert_eq!(included.len(), 2);
    }

    #[test]
    fn test_pack_never_exceeds_budget() {
        let records: Vec<_> = (0..20).map(|i| record(i, &"x".repeat(100))).collect();
        for budget in [1, 50, 129, 130, 131, 262, 263, 500, 2_000] {
            let (context, included) = pack(records.clone(), budget);
            assert!(context.chars().count() <= budget, "budget {}", budget);
            if included.len() < records.len() {
                // the next piece would not have fit
                let next = format!("{}\n{}", piece_header(included.len() + 1, &records[0]), "x".repeat(100));
                let sep = if included.is_empty() { 0 } else { 2 };
                assert!(context.chars().count() + sep + next.chars().count() > budget);
            }
        }
    }

    #[test]
    fn test_pack_stops_at_first_overflow() {
        let records = vec![record(1, "short"), record(2, &"y".repeat(500)), record(3, "tiny")];
        let (context, included) = pack(records, 200);
        assert_eq!(included.len(), 1);
        assert!(!context.contains("tiny"));
    }

    #[test]
    fn test_pack_counts_chars_not_bytes() {
        let text = "é".repeat(40);
        let header_len = piece_header(1, &record(1, "")).chars().count();
        let (_, included) = pack(vec![record(1, &text)], header_len + 1 + 40);
        assert_eq!(included.len(), 1);
    }
}
