//! Paragraph-run chunker, the fallback for every other strategy.
//!
//! Lines accumulate into a buffer. The buffer is flushed as a `block` chunk
//! when its joined length reaches `max_chars`, or when a blank line arrives
//! and the buffer already holds at least [`MIN_PARAGRAPH_LINES`] lines.

use crate::models::{Chunk, ChunkKind, Document};

use super::{base_meta, char_len, is_blank, line_chunk, renumber, split_lines};

/// Minimum buffered lines before a blank line closes a chunk.
pub const MIN_PARAGRAPH_LINES: usize = 10;

#[derive(Debug, Clone)]
pub struct PlainChunker {
    pub max_chars: usize,
}

impl PlainChunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let lines = split_lines(&doc.text);
        let meta = base_meta(doc);
        let mut chunks = Vec::new();

        let mut start = 0usize;
        let mut buf_lines = 0usize;
        let mut buf_chars = 0usize;

        for (i, line) in lines.iter().enumerate() {
            // joined length: one '\n' between buffered lines
            buf_chars += char_len(line) + usize::from(buf_lines > 0);
            buf_lines += 1;

            let full = buf_chars >= self.max_chars;
            let paragraph_end = is_blank(line) && buf_lines >= MIN_PARAGRAPH_LINES;
            if full || paragraph_end {
                chunks.extend(line_chunk(&lines, start, i, ChunkKind::Block, &meta));
                start = i + 1;
                buf_lines = 0;
                buf_chars = 0;
            }
        }

        if buf_lines > 0 {
            chunks.extend(line_chunk(&lines, start, lines.len() - 1, ChunkKind::Block, &meta));
        }

        renumber(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::test_support::assert_partition;
    use crate::models::DocType;

    fn doc(text: &str) -> Document {
        Document::new("d1", "/src/notes.txt", DocType::Text, text)
    }

    #[test]
    fn test_small_text_single_chunk() {
        let d = doc("Hello, world!\nSecond line.");
        let chunks = PlainChunker::new(4500).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert_eq!(chunks[0].meta.get("doc_type").unwrap(), "text");
    }

    #[test]
    fn test_empty_and_blank_text_yield_nothing() {
        assert!(PlainChunker::new(4500).chunk(&doc("")).is_empty());
        assert!(PlainChunker::new(4500).chunk(&doc("\n  \n\t\n")).is_empty());
    }

    #[test]
    fn test_blank_line_closes_long_paragraph() {
        let mut text = (1..=12).map(|i| format!("line {}", i)).collect::<Vec<_>>();
        text.push(String::new());
        text.extend((13..=15).map(|i| format!("line {}", i)));
        let d = doc(&text.join("\n"));
        let chunks = PlainChunker::new(4500).chunk(&d);
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 12));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (14, 16));
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_short_paragraphs_stay_together() {
        let d = doc("a\nb\n\nc\nd\n\ne");
        let chunks = PlainChunker::new(4500).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a\nb\n\nc\nd\n\ne");
    }

    #[test]
    fn test_char_ceiling_flushes() {
        let text = (0..40)
            .map(|i| format!("row {:02} abcdefghij", i))
            .collect::<Vec<_>>()
            .join("\n");
        let d = doc(&text);
        let chunks = PlainChunker::new(100).chunk(&d);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // a chunk stops at the first line that reaches the ceiling
            let without_last = chunk.text.rsplit_once('\n').map(|(head, _)| head.len());
            assert!(without_last.unwrap_or(0) < 100);
        }
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_deterministic() {
        let text = (0..200).map(|i| format!("entry {}", i)).collect::<Vec<_>>().join("\n\n");
        let d = doc(&text);
        let a = PlainChunker::new(300).chunk(&d);
        let b = PlainChunker::new(300).chunk(&d);
        assert_eq!(a, b);
        assert_partition(&d, &a);
    }

    #[test]
    fn test_crlf_lines() {
        let d = doc("first\r\nsecond\r\n");
        let chunks = PlainChunker::new(4500).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "first\nsecond");
        assert_eq!(chunks[0].end_line, 2);
    }
}
