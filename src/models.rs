//! Core data models used throughout Retrofit.
//!
//! These types represent the documents, chunks, search hits, and citations
//! that flow through the indexing and retrieval pipeline. Documents and
//! chunks are immutable values: a changed file produces a fresh
//! [`Document`] and a fresh chunk list, never an in-place edit.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Open string map carried by documents and chunks.
pub type Meta = BTreeMap<String, String>;

/// Kind of source a document holds. Selects the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Text,
    Dcl,
    C,
    Sqlmod,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Text => "text",
            DocType::Dcl => "dcl",
            DocType::C => "c",
            DocType::Sqlmod => "sqlmod",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(DocType::Text),
            "dcl" => Ok(DocType::Dcl),
            "c" => Ok(DocType::C),
            "sqlmod" => Ok(DocType::Sqlmod),
            other => Err(format!(
                "unknown doc type '{}'. Must be text, dcl, c, or sqlmod.",
                other
            )),
        }
    }
}

/// Structural tag attached to each chunk by its chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Block,
    Function,
    FunctionPart,
    Query,
    QueryPart,
    Label,
    Section,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Block => "block",
            ChunkKind::Function => "function",
            ChunkKind::FunctionPart => "function_part",
            ChunkKind::Query => "query",
            ChunkKind::QueryPart => "query_part",
            ChunkKind::Label => "label",
            ChunkKind::Section => "section",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file loaded for chunking.
///
/// `doc_id` is derived from the absolute path, not from content, so it is
/// stable across indexing runs for as long as the file is not moved.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub path: String,
    /// Parent folder relative to the indexing root, `/`-separated, `""` at the root.
    pub rel_folder: String,
    pub doc_type: DocType,
    pub text: String,
    pub meta: Meta,
}

impl Document {
    /// Builds a document with no metadata, mostly for chunker callers and tests.
    pub fn new(doc_id: &str, path: &str, doc_type: DocType, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            path: path.to_string(),
            rel_folder: String::new(),
            doc_type,
            text: text.into(),
            meta: Meta::new(),
        }
    }

    /// A copy of this document carrying only `text`. Used when a chunker
    /// re-chunks one oversized unit in isolation.
    pub fn sub_document(&self, text: &str) -> Self {
        Self {
            doc_id: self.doc_id.clone(),
            path: self.path.clone(),
            rel_folder: self.rel_folder.clone(),
            doc_type: self.doc_type,
            text: text.to_string(),
            meta: self.meta.clone(),
        }
    }
}

/// A contiguous, line-addressable excerpt of a document.
///
/// `start_line` and `end_line` are 1-based and inclusive, relative to the
/// owning document's original text. Citations are built from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub kind: ChunkKind,
    pub meta: Meta,
}

/// A ranked full-text search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub path: String,
    pub doc_type: String,
    pub rel_folder: String,
    /// Raw BM25 rank; lower is better.
    pub rank: f64,
    /// `1 / (1 + max(0, rank))`, always in `(0, 1]`.
    pub score: f64,
    pub snippet: String,
}

/// A stored chunk joined with its owning document's path, type and folder.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub chunk_id: i64,
    pub doc_id: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub kind: String,
    pub text: String,
    pub path: String,
    pub doc_type: String,
    pub rel_folder: String,
}

/// Line-range reference to a packed context excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub doc_type: String,
}
