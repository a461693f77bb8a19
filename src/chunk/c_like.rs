//! C-family chunker.
//!
//! Function openings are found with one multi-line regex over the whole
//! text: a return-type-like prefix, an identifier, a parenthesised parameter
//! list and an opening brace at end of line. It is a heuristic, not a
//! parser; anything it cannot segment goes to the [`PlainChunker`].
//!
//! Each function runs from its match to the next match (or end of file).
//! Text before the first function (includes, globals, file banners) is
//! chunked as plain `block`s so the whole file stays covered. A function
//! over `max_chars` is re-chunked by the plain chunker as a sub-document
//! and its pieces are re-offset into the file's line numbers as
//! `function_part`.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Chunk, ChunkKind, Document, Meta};

use super::{
    base_meta, char_len, line_chunk, non_blank_span, renumber, reoffset, split_lines, PlainChunker,
};

static FUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[A-Za-z_][\w\s\*\(\)]*?)\s+([A-Za-z_]\w*)\s*\([^;{}]*\)\s*\{[ \t\r]*$")
        .unwrap()
});

/// Control keywords the prefix heuristic would otherwise take for names
/// (`} else if (x) {`).
const NOT_FUNCTIONS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "do", "else"];

#[derive(Debug, Clone)]
pub struct CLikeChunker {
    pub max_chars: usize,
    plain: PlainChunker,
}

/// A detected function opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStart {
    /// Byte offset of the match.
    pub offset: usize,
    pub name: String,
}

/// Byte offsets at which each line starts; `line_starts[0] == 0`.
pub fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// 1-based line holding byte `offset`, by binary search over `starts`.
pub fn line_of(starts: &[usize], offset: usize) -> usize {
    starts.partition_point(|&s| s <= offset)
}

/// All function openings in `text`, in order.
pub fn find_functions(text: &str) -> Vec<FunctionStart> {
    FUNC_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            if NOT_FUNCTIONS.contains(&name) {
                return None;
            }
            Some(FunctionStart {
                offset: whole.start(),
                name: name.to_string(),
            })
        })
        .collect()
}

impl CLikeChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            plain: PlainChunker::new(max_chars),
        }
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let functions = find_functions(&doc.text);
        if functions.is_empty() {
            return self.plain.chunk(doc);
        }

        let lines = split_lines(&doc.text);
        let starts = line_starts(&doc.text);
        let meta = base_meta(doc);

        // 0-based first line of each function; the regex anchors at `^`
        let first_lines: Vec<usize> = functions
            .iter()
            .map(|f| line_of(&starts, f.offset) - 1)
            .collect();

        let mut chunks = Vec::new();

        if first_lines[0] > 0 {
            let preamble_end = first_lines[0] - 1;
            chunks.extend(self.plain_span(doc, &lines, 0, preamble_end, ChunkKind::Block, &meta));
        }

        for (i, function) in functions.iter().enumerate() {
            let start = first_lines[i];
            let end = match first_lines.get(i + 1) {
                Some(&next) => next - 1,
                None => lines.len() - 1,
            };

            let mut fn_meta = meta.clone();
            fn_meta.insert("function".to_string(), function.name.clone());

            let Some(chunk) = line_chunk(&lines, start, end, ChunkKind::Function, &fn_meta) else {
                continue;
            };
            if char_len(&chunk.text) <= self.max_chars {
                chunks.push(chunk);
            } else {
                let parts = self.plain_span(doc, &lines, start, end, ChunkKind::FunctionPart, &fn_meta);
                chunks.extend(parts);
            }
        }

        renumber(chunks)
    }

    /// Plain-chunks lines `[start, end]` as a sub-document and maps the
    /// pieces back onto the parent's line numbers.
    fn plain_span(
        &self,
        doc: &Document,
        lines: &[&str],
        start: usize,
        end: usize,
        kind: ChunkKind,
        meta: &Meta,
    ) -> Vec<Chunk> {
        let Some((first, last)) = non_blank_span(lines, start, end) else {
            return Vec::new();
        };
        let sub = doc.sub_document(&lines[first..=last].join("\n"));
        reoffset(self.plain.chunk(&sub), first + 1, kind, meta)
    }
}
