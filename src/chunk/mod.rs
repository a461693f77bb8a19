//! Language-aware chunking.
//!
//! Turns a [`Document`] into an ordered list of line-addressable [`Chunk`]s.
//! Four strategies exist, one per [`DocType`]:
//!
//! | Strategy | Doc type | Unit | Kinds |
//! |----------|----------|------|-------|
//! | [`PlainChunker`] | `text` (and every fallback) | paragraph runs under a char ceiling | `block` |
//! | [`DclChunker`] | `dcl` | label / section / phase segments | `label`, `section`, `block` |
//! | [`CLikeChunker`] | `c` | regex-detected functions | `function`, `function_part` |
//! | [`SqlChunker`] | `sqlmod` | statements | `query`, `query_part` |
//!
//! # Guarantees
//!
//! Every strategy is deterministic and:
//!
//! - assigns `chunk_index` densely from 0 in document order;
//! - never emits a chunk whose text is empty or whitespace-only;
//! - covers every non-blank line of the input exactly once, so chunk line
//!   ranges never overlap and only blank lines may fall between them;
//! - trims leading and trailing blank lines from each chunk, narrowing its
//!   line range to match.
//!
//! Lines are split on `\n` (a trailing `\r` is dropped), so line numbers
//! agree with what an editor shows for both Unix and DOS line endings.

pub mod c_like;
pub mod dcl;
pub mod plain;
pub mod sql;

use std::collections::HashMap;

pub use c_like::CLikeChunker;
pub use dcl::DclChunker;
pub use plain::PlainChunker;
pub use sql::SqlChunker;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkKind, DocType, Document, Meta};

/// One of the four segmentation strategies.
#[derive(Debug, Clone)]
pub enum Chunker {
    Plain(PlainChunker),
    Dcl(DclChunker),
    CLike(CLikeChunker),
    Sql(SqlChunker),
}

impl Chunker {
    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        match self {
            Chunker::Plain(c) => c.chunk(doc),
            Chunker::Dcl(c) => c.chunk(doc),
            Chunker::CLike(c) => c.chunk(doc),
            Chunker::Sql(c) => c.chunk(doc),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chunker::Plain(_) => "plain",
            Chunker::Dcl(_) => "dcl",
            Chunker::CLike(_) => "c_like",
            Chunker::Sql(_) => "sql",
        }
    }
}

/// Maps each [`DocType`] to its chunker, with an explicit fallback for
/// types that have none registered.
#[derive(Debug, Clone)]
pub struct ChunkerRegistry {
    by_type: HashMap<DocType, Chunker>,
    fallback: Chunker,
}

impl ChunkerRegistry {
    /// An empty registry that resolves every type to `fallback`.
    pub fn new(fallback: Chunker) -> Self {
        Self {
            by_type: HashMap::new(),
            fallback,
        }
    }

    /// The four built-in strategies, sized from `config`.
    pub fn from_config(config: &ChunkingConfig) -> Self {
        let plain = PlainChunker::new(config.plain_max_chars);
        let mut registry = Self::new(Chunker::Plain(plain.clone()));
        registry.register(DocType::Text, Chunker::Plain(plain));
        registry.register(
            DocType::Dcl,
            Chunker::Dcl(DclChunker::new(
                config.dcl_min_lines,
                config.dcl_max_lines,
                config.dcl_max_chars,
            )),
        );
        registry.register(DocType::C, Chunker::CLike(CLikeChunker::new(config.c_max_chars)));
        registry.register(
            DocType::Sqlmod,
            Chunker::Sql(SqlChunker::new(
                config.sql_max_lines,
                config.sql_fallback_max_chars,
            )),
        );
        registry
    }

    /// Registers (or replaces) the chunker for `doc_type`.
    pub fn register(&mut self, doc_type: DocType, chunker: Chunker) {
        self.by_type.insert(doc_type, chunker);
    }

    pub fn resolve(&self, doc_type: DocType) -> &Chunker {
        self.by_type.get(&doc_type).unwrap_or(&self.fallback)
    }
}

impl Default for ChunkerRegistry {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

// ============ Shared helpers ============

pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Character length, the unit every ceiling is expressed in.
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Narrows the 0-based inclusive range `[start, end]` to its first and last
/// non-blank lines. `None` when the range holds only blank lines.
pub(crate) fn non_blank_span(lines: &[&str], start: usize, end: usize) -> Option<(usize, usize)> {
    let first = (start..=end).find(|&i| !is_blank(lines[i]))?;
    let last = (first..=end).rev().find(|&i| !is_blank(lines[i]))?;
    Some((first, last))
}

/// Metadata every chunk of `doc` carries.
pub(crate) fn base_meta(doc: &Document) -> Meta {
    let mut meta = Meta::new();
    meta.insert("doc_type".to_string(), doc.doc_type.as_str().to_string());
    meta.insert("path".to_string(), doc.path.clone());
    meta
}

/// Builds a chunk over lines `[start, end]` (0-based, inclusive), trimmed of
/// blank edge lines. The index is left at 0 for [`renumber`] to assign.
pub(crate) fn line_chunk(
    lines: &[&str],
    start: usize,
    end: usize,
    kind: ChunkKind,
    meta: &Meta,
) -> Option<Chunk> {
    let (first, last) = non_blank_span(lines, start, end)?;
    Some(Chunk {
        chunk_index: 0,
        start_line: first + 1,
        end_line: last + 1,
        text: lines[first..=last].join("\n"),
        kind,
        meta: meta.clone(),
    })
}

/// Moves chunks produced from a sub-document into the parent's line space.
/// `first_line` is the 1-based parent line holding the sub-document's line 1.
pub(crate) fn reoffset(
    chunks: Vec<Chunk>,
    first_line: usize,
    kind: ChunkKind,
    meta: &Meta,
) -> Vec<Chunk> {
    chunks
        .into_iter()
        .map(|sub| Chunk {
            chunk_index: 0,
            start_line: first_line + sub.start_line - 1,
            end_line: first_line + sub.end_line - 1,
            text: sub.text,
            kind,
            meta: meta.clone(),
        })
        .collect()
}

/// Assigns dense indices in list order.
pub(crate) fn renumber(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }
    chunks
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Asserts the coverage invariants every chunker promises.
    pub fn assert_partition(doc: &Document, chunks: &[Chunk]) {
        let lines = split_lines(&doc.text);
        let mut next_line = 1usize;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i, "indices must be dense");
            assert!(chunk.start_line >= next_line, "chunk {} overlaps its predecessor", i);
            assert!(chunk.start_line <= chunk.end_line);
            assert!(!chunk.text.trim().is_empty(), "chunk {} is blank", i);
            for gap in next_line..chunk.start_line {
                assert!(is_blank(lines[gap - 1]), "line {} is not covered", gap);
            }
            assert_eq!(
                chunk.text,
                lines[chunk.start_line - 1..chunk.end_line].join("\n"),
                "chunk {} text must be the exact line range",
                i
            );
            next_line = chunk.end_line + 1;
        }
        for tail in next_line..=lines.len() {
            assert!(is_blank(lines[tail - 1]), "line {} is not covered", tail);
        }
    }
}
