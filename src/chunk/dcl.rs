//! Command-script (DCL) chunker.
//!
//! Segments a `$`-prefixed command procedure on structural lines:
//!
//! - **label** — a bare `$name:` declaration;
//! - **section** — a `$!` comment banner (`$! -----`) or explicit
//!   `$! SECTION` / `$! PHASE` marker;
//! - **block** — a phase-opening command: `SET NOON|ON|VERIFY|DEFAULT|MESSAGE`,
//!   `ON ERROR`, `EXIT`, `STOP`, `LOGOUT`, `RUN`, `MCR`, `PIPE`, `SUBMIT`, `@proc`.
//!
//! A structural line opens a new segment unless it is already the first line
//! of the current one. A segment also closes on a blank line once it reaches
//! `max(min_lines, 12)` lines.
//!
//! Two passes follow. The **merge** pass folds every segment shorter than
//! `min_lines` into its predecessor (and lets a short leading segment absorb
//! its successor). The **split** pass slices any segment above `max_lines`
//! or `max_chars` into greedy line windows starting at the segment's own
//! first line. A window closes before the line that would take it past
//! `max_lines` lines or `max_chars` characters; a single line longer than
//! `max_chars` becomes a window of its own.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Chunk, ChunkKind, Document};

use super::{base_meta, char_len, is_blank, line_chunk, non_blank_span, renumber, split_lines};

/// Lower bound on the line count at which a blank line force-closes a segment.
const FORCE_CLOSE_LINES: usize = 12;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\$[A-Za-z0-9_]+:\s*$").unwrap());

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\$!\s*(?:[-=]{3,}|(?:SECTION|PHASE)\b)").unwrap()
});

static PHASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*\$\s*(?:SET\s+(?:NOON|ON|VERIFY|DEFAULT|MESSAGE)|ON\s+ERROR|EXIT\b|STOP\b|LOGOUT\b|RUN\b|MCR\b|PIPE\b|SUBMIT\b|@)\b",
    )
    .unwrap()
});

#[derive(Debug, Clone)]
pub struct DclChunker {
    pub min_lines: usize,
    pub max_lines: usize,
    pub max_chars: usize,
}

/// A run of lines `[start, end]` (0-based, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: usize,
    end: usize,
    kind: ChunkKind,
}

impl Segment {
    fn len(&self) -> usize {
        self.end + 1 - self.start
    }
}

/// Structural role of a single line, if any.
pub fn classify_line(line: &str) -> Option<ChunkKind> {
    if LABEL_RE.is_match(line) {
        Some(ChunkKind::Label)
    } else if SECTION_RE.is_match(line) {
        Some(ChunkKind::Section)
    } else if PHASE_RE.is_match(line) {
        Some(ChunkKind::Block)
    } else {
        None
    }
}

impl DclChunker {
    pub fn new(min_lines: usize, max_lines: usize, max_chars: usize) -> Self {
        Self {
            min_lines,
            max_lines,
            max_chars,
        }
    }

    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let lines = split_lines(&doc.text);
        let meta = base_meta(doc);

        let segments = self.segment(&lines);
        let merged = self.merge(&lines, segments);

        let mut chunks = Vec::new();
        for seg in merged {
            let Some((first, last)) = non_blank_span(&lines, seg.start, seg.end) else {
                continue;
            };
            let n_lines = last + 1 - first;
            let n_chars = char_len(&lines[first..=last].join("\n"));
            if n_lines <= self.max_lines && n_chars <= self.max_chars {
                chunks.extend(line_chunk(&lines, first, last, seg.kind, &meta));
                continue;
            }

            let windows = self.windows(&lines, first, last);
            let total = windows.len();
            for (w, (w_start, w_end)) in windows.into_iter().enumerate() {
                let mut part_meta = meta.clone();
                part_meta.insert("part".to_string(), format!("{}/{}", w + 1, total));
                chunks.extend(line_chunk(&lines, w_start, w_end, seg.kind, &part_meta));
            }
        }

        renumber(chunks)
    }

    /// Greedy windows over lines `[first, last]` of an oversized segment.
    /// Windows holding only blank lines are dropped so `part` stays dense.
    fn windows(&self, lines: &[&str], first: usize, last: usize) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut start = first;
        let mut chars = 0usize;

        for (offset, line) in lines[first..=last].iter().enumerate() {
            let i = first + offset;
            let len = char_len(line);
            let held = i - start;
            if held > 0 && (held >= self.max_lines || chars + 1 + len > self.max_chars) {
                windows.push((start, i - 1));
                start = i;
                chars = 0;
            }
            chars += if i == start { len } else { len + 1 };
        }
        windows.push((start, last));

        windows.retain(|&(s, e)| non_blank_span(lines, s, e).is_some());
        windows
    }

    fn segment(&self, lines: &[&str]) -> Vec<Segment> {
        let force_close = self.min_lines.max(FORCE_CLOSE_LINES);
        let mut segments = Vec::new();
        let mut start = 0usize;
        let mut kind = ChunkKind::Block;

        for (i, line) in lines.iter().enumerate() {
            if let Some(k) = classify_line(line) {
                if i != start {
                    segments.push(Segment {
                        start,
                        end: i - 1,
                        kind,
                    });
                    start = i;
                }
                kind = k;
            }
            if is_blank(line) && i + 1 - start >= force_close {
                segments.push(Segment {
                    start,
                    end: i,
                    kind,
                });
                start = i + 1;
                kind = ChunkKind::Block;
            }
        }
        if start < lines.len() {
            segments.push(Segment {
                start,
                end: lines.len() - 1,
                kind,
            });
        }
        segments
    }

    fn merge(&self, lines: &[&str], segments: Vec<Segment>) -> Vec<Segment> {
        let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
        for seg in segments {
            if non_blank_span(lines, seg.start, seg.end).is_none() {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if seg.len() < self.min_lines || prev.len() < self.min_lines => {
                    prev.end = seg.end;
                }
                _ => merged.push(seg),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::test_support::assert_partition;
    use crate::models::DocType;

    fn doc(text: &str) -> Document {
        Document::new("d1", "/src/BUILD.COM", DocType::Dcl, text)
    }

    fn body(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("$ WRITE SYS$OUTPUT \"{} {}\"", prefix, i)).collect()
    }

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify_line("$START:"), Some(ChunkKind::Label));
        assert_eq!(classify_line("  $ERR_HANDLER:  "), Some(ChunkKind::Label));
        assert_eq!(classify_line("$! ---------------"), Some(ChunkKind::Section));
        assert_eq!(classify_line("$! section cleanup"), Some(ChunkKind::Section));
        assert_eq!(classify_line("$ SET NOON"), Some(ChunkKind::Block));
        assert_eq!(classify_line("$ on error then goto fail"), Some(ChunkKind::Block));
        assert_eq!(classify_line("$ RUN SYS$SYSTEM:PAYROLL"), Some(ChunkKind::Block));
        assert_eq!(classify_line("$ @SYS$LOGIN:SETUP"), Some(ChunkKind::Block));
        assert_eq!(classify_line("$ EXIT"), Some(ChunkKind::Block));
        assert_eq!(classify_line("$ COPY A.DAT B.DAT"), None);
        assert_eq!(classify_line("$! plain comment"), None);
        assert_eq!(classify_line("$ RUNNER = 1"), None);
    }

    #[test]
    fn test_three_small_labels_merge_into_one() {
        let mut lines = vec!["$A:".to_string()];
        lines.extend(body("a", 2));
        lines.push("$B:".to_string());
        lines.extend(body("b", 2));
        lines.push("$C:".to_string());
        lines.extend(body("c", 2));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 60, 4500).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 9);
        assert_eq!(chunks[0].kind, ChunkKind::Label);
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_large_labels_stay_separate() {
        let mut lines = vec!["$MAIN:".to_string()];
        lines.extend(body("main", 9));
        lines.push("$CLEANUP:".to_string());
        lines.extend(body("cleanup", 9));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 60, 4500).chunk(&d);
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 10));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (11, 20));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Label));
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_short_trailing_segment_joins_predecessor() {
        let mut lines = vec!["$MAIN:".to_string()];
        lines.extend(body("main", 9));
        lines.push("$ EXIT".to_string());
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 60, 4500).chunk(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 11);
    }

    #[test]
    fn test_blank_line_force_closes_long_segment() {
        let mut lines = body("x", 13);
        lines.push(String::new());
        lines.extend(body("y", 10));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 60, 4500).chunk(&d);
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 13));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (15, 24));
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_oversized_segment_split_into_windows() {
        let mut lines = vec!["$LOOP:".to_string()];
        lines.extend(body("loop", 149));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 60, 100_000).chunk(&d);
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 60));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (61, 120));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (121, 150));
        assert_eq!(chunks[1].meta.get("part").unwrap(), "2/3");
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Label));
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_char_ceiling_triggers_split() {
        let mut lines = vec!["$BIG:".to_string()];
        lines.extend(body("a fairly long line of output text", 20));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 10, 300).chunk(&d);
        assert_eq!(
            chunks.iter().map(|c| (c.start_line, c.end_line)).collect::<Vec<_>>(),
            vec![(1, 6), (7, 11), (12, 16), (17, 21)]
        );
        assert_eq!(chunks[3].meta.get("part").unwrap(), "4/4");
        assert!(chunks.iter().all(|c| char_len(&c.text) <= 300));
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_uneven_lines_stay_under_char_ceiling() {
        let mut lines = vec!["$BIG:".to_string()];
        for i in 0..30 {
            let width = if i % 6 == 5 { 200 } else { 10 };
            lines.push(format!("$ WRITE SYS$OUTPUT \"{}\"", "x".repeat(width)));
        }
        lines.push(format!("$ WRITE SYS$OUTPUT \"{}\"", "y".repeat(400)));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 12, 300).chunk(&d);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.end_line + 1 - c.start_line <= 12);
            // only a single overlong line may exceed the ceiling
            assert!(char_len(&c.text) <= 300 || c.start_line == c.end_line);
        }
        assert_eq!(chunks.last().unwrap().start_line, 32);
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_split_windows_offset_from_segment_start() {
        let mut lines = vec!["$ SET NOON".to_string()];
        lines.extend(body("pre", 9));
        lines.push("$WORK:".to_string());
        lines.extend(body("work", 24));
        let d = doc(&lines.join("\n"));
        let chunks = DclChunker::new(8, 10, 100_000).chunk(&d);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[1].start_line, 11);
        assert_eq!(chunks[1].end_line, 20);
        assert_eq!(chunks.last().unwrap().end_line, 35);
        assert_partition(&d, &chunks);
    }

    #[test]
    fn test_blank_only_input() {
        let d = doc("\n\n   \n");
        assert!(DclChunker::new(8, 60, 4500).chunk(&d).is_empty());
    }
}
