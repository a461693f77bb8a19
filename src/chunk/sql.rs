//! SQL / embedded-SQL module chunker.
//!
//! Lines stream into a statement buffer. A line opening with a statement
//! keyword starts a new statement when the buffer is non-empty; a line
//! ending in `;` or a buffer of `max_lines` lines closes one. Each statement
//! becomes a `query` chunk. A statement over `fallback_max_chars` is
//! re-chunked by the [`PlainChunker`] and emitted as `query_part` pieces.
//!
//! When the whole file yields at most one statement but is larger than
//! `fallback_max_chars`, there was no usable structure and the file is
//! handed to the plain chunker as-is.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Chunk, ChunkKind, Document, Meta};

use super::{base_meta, char_len, line_chunk, renumber, reoffset, split_lines, PlainChunker};

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:SELECT|UPDATE|INSERT|DELETE|CREATE|DROP|ALTER|DECLARE)\b").unwrap()
});

static STMT_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";\s*$").unwrap());

#[derive(Debug, Clone)]
pub struct SqlChunker {
    pub max_lines: usize,
    pub fallback_max_chars: usize,
    plain: PlainChunker,
}

impl SqlChunker {
    pub fn new(max_lines: usize, fallback_max_chars: usize) -> Self {
        Self {
            max_lines,
            fallback_max_chars,
            plain: PlainChunker::new(fallback_max_chars),
        }
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let lines = split_lines(&doc.text);
        let meta = base_meta(doc);

        let mut statements: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        let mut buffered = 0usize;

        for (i, line) in lines.iter().enumerate() {
            if buffered > 0 && KEYWORD_RE.is_match(line) {
                statements.push((start, i - 1));
                start = i;
                buffered = 0;
            }
            buffered += 1;
            if STMT_END_RE.is_match(line) || buffered >= self.max_lines {
                statements.push((start, i));
                start = i + 1;
                buffered = 0;
            }
        }
        if buffered > 0 {
            statements.push((start, lines.len() - 1));
        }

        let statements: Vec<Chunk> = statements
            .into_iter()
            .filter_map(|(s, e)| line_chunk(&lines, s, e, ChunkKind::Query, &meta))
            .collect();

        if statements.len() <= 1 && char_len(&doc.text) > self.fallback_max_chars {
            return self.plain.chunk(doc);
        }

        let mut chunks = Vec::with_capacity(statements.len());
        for statement in statements {
            if char_len(&statement.text) <= self.fallback_max_chars {
                chunks.push(statement);
            } else {
                chunks.extend(self.split_statement(doc, statement, &meta));
            }
        }
        renumber(chunks)
    }

    fn split_statement(&self, doc: &Document, statement: Chunk, meta: &Meta) -> Vec<Chunk> {
        let sub = doc.sub_document(&statement.text);
        reoffset(self.plain.chunk(&sub), statement.start_line, ChunkKind::QueryPart, meta)
    }
}
