//! Ranked full-text search over indexed chunks.
//!
//! User text never reaches FTS5 as query syntax: quote characters become
//! spaces and what remains is wrapped in one quoted phrase, so operators
//! like `AND`, `NEAR`, `-` or `col:` are searched for literally.

use anyhow::Result as AnyResult;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::models::{DocType, SearchHit};
use crate::store::{self, SearchFilter};

/// Characters treated as quotes and replaced by spaces.
const QUOTE_CHARS: &[char] = &['"', '\'', '`', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}'];

/// Output style for CLI printers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Turns free text into a single FTS5 phrase, or `None` when nothing
/// searchable remains. Quotes and control characters (NUL included, which
/// FTS5 reads as the end of the expression) become spaces.
pub fn sanitize_query(query: &str) -> Option<String> {
    let cleaned = query
        .replace(|c: char| QUOTE_CHARS.contains(&c) || c.is_control(), " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("\"{}\"", cleaned))
    }
}

/// Maps a raw `bm25` rank to `(0, 1]`: `1 / (1 + max(0, rank))`.
pub fn score_from_rank(rank: f64) -> f64 {
    1.0 / (1.0 + rank.max(0.0))
}

/// Normalises a scope to the `/`-separated form stored in `rel_folder`.
/// Empty and `.` scopes mean "no filter".
pub fn normalize_scope(scope: &str) -> Option<String> {
    let s = scope.trim().replace('\\', "/");
    let s = s.trim_matches('/');
    if s.is_empty() || s == "." {
        None
    } else {
        Some(s.to_string())
    }
}

/// Search parameters shared by the CLI, HTTP and context assembly.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: i64,
    pub doc_type: Option<DocType>,
    pub scope: Option<String>,
    pub snippet_tokens: i64,
}

impl SearchOptions {
    pub fn new(top_k: i64) -> Self {
        Self {
            top_k,
            doc_type: None,
            scope: None,
            snippet_tokens: 24,
        }
    }

    pub fn with_doc_type(mut self, doc_type: Option<DocType>) -> Self {
        self.doc_type = doc_type;
        self
    }

    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.and_then(normalize_scope);
        self
    }

    pub fn with_snippet_tokens(mut self, tokens: i64) -> Self {
        self.snippet_tokens = tokens;
        self
    }
}

/// Ranked hits for `query`, best first, at most `top_k`.
pub async fn search(pool: &SqlitePool, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
    let Some(match_expr) = sanitize_query(query) else {
        return Ok(Vec::new());
    };
    if opts.top_k < 1 {
        return Ok(Vec::new());
    }

    let filter = SearchFilter {
        doc_type: opts.doc_type.map(|t| t.as_str()),
        scope: opts.scope.as_deref(),
    };
    store::search_fts(pool, &match_expr, opts.top_k, &filter, opts.snippet_tokens).await
}

/// A hit with its chunk's line range and kind, as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct LocatedHit {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub start_line: i64,
    pub end_line: i64,
    pub kind: String,
}

/// Attaches line ranges to hits. A hit whose chunk vanished between the
/// search and the lookup (concurrent re-index) is dropped.
pub async fn locate(pool: &SqlitePool, hits: Vec<SearchHit>) -> Result<Vec<LocatedHit>> {
    let mut located = Vec::with_capacity(hits.len());
    for hit in hits {
        match store::get_chunk(pool, hit.chunk_id).await {
            Ok(record) => located.push(LocatedHit {
                hit,
                start_line: record.start_line,
                end_line: record.end_line,
                kind: record.kind,
            }),
            Err(Error::ChunkNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(located)
}

/// CLI entry point for `retrofit query`.
pub async fn run_query(
    config: &Config,
    query: &str,
    opts: &SearchOptions,
    format: OutputFormat,
) -> AnyResult<()> {
    let pool = db::open(&config.db.path).await?;
    let hits = search(&pool, query, opts).await?;
    let located = locate(&pool, hits).await?;
    pool.close().await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&located)?);
        return Ok(());
    }

    if located.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, h) in located.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({}) lines {}-{} {}",
            i + 1,
            h.hit.score,
            h.hit.path,
            h.hit.doc_type,
            h.start_line,
            h.end_line,
            h.kind
        );
        if !h.hit.rel_folder.is_empty() {
            println!("    folder: {}", h.hit.rel_folder);
        }
        println!("    rank: {:.4}", h.hit.rank);
        println!("    snippet: {}", h.hit.snippet.replace('\n', " ").trim());
        println!("    id: {}", h.hit.chunk_id);
        println!();
    }

    Ok(())
}
