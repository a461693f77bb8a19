//! Document type detection.
//!
//! The extension table wins. For unknown extensions the first
//! [`PREVIEW_LINES`] lines are sniffed for DCL's `$` sigil; everything else
//! is `text`.

use std::path::Path;

use crate::models::DocType;

/// Lines of a file inspected by the content sniff.
pub const PREVIEW_LINES: usize = 80;

/// Lines handed to [`detect`] by the indexer.
pub const PREVIEW_READ_LINES: usize = 120;

/// Maps a lowercase extension (with or without the leading dot) to a type.
pub fn type_for_extension(ext: &str) -> Option<DocType> {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "com" | "dcl" => Some(DocType::Dcl),
        "c" | "h" | "hpp" | "hh" | "cc" | "cpp" => Some(DocType::C),
        "sql" | "sqlmod" | "sc" | "ddl" => Some(DocType::Sqlmod),
        _ => None,
    }
}

/// Classifies a file from its path and a bounded text prefix.
pub fn detect(path: &Path, preview: &str) -> DocType {
    if let Some(doc_type) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(type_for_extension)
    {
        return doc_type;
    }

    let lines: Vec<&str> = preview.lines().take(PREVIEW_LINES).collect();
    if !lines.is_empty() {
        let sigils = lines
            .iter()
            .filter(|l| l.trim_start().starts_with('$'))
            .count();
        let threshold = (lines.len() * 6 / 10).max(10);
        if sigils >= threshold {
            return DocType::Dcl;
        }
    }

    DocType::Text
}

/// The first `n` lines of `text`, newline-joined.
pub fn preview(text: &str, n: usize) -> String {
    text.lines().take(n).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(detect(Path::new("/a/BUILD.COM"), ""), DocType::Dcl);
        assert_eq!(detect(Path::new("x.dcl"), ""), DocType::Dcl);
        assert_eq!(detect(Path::new("x.h"), ""), DocType::C);
        assert_eq!(detect(Path::new("x.cpp"), ""), DocType::C);
        assert_eq!(detect(Path::new("orders.sqlmod"), ""), DocType::Sqlmod);
        assert_eq!(detect(Path::new("schema.DDL"), ""), DocType::Sqlmod);
        assert_eq!(detect(Path::new("readme.md"), "hello"), DocType::Text);
    }

    #[test]
    fn test_extension_beats_content() {
        let dollars = "$ SET NOON\n".repeat(30);
        assert_eq!(detect(Path::new("main.c"), &dollars), DocType::C);
    }

    #[test]
    fn test_sigil_sniff() {
        let script = "$ SET NOON\n".repeat(12);
        assert_eq!(detect(Path::new("job.txt"), &script), DocType::Dcl);
    }

    #[test]
    fn test_sniff_needs_ten_lines() {
        // 100% of five lines is still under the absolute floor
        let script = "$ RUN PROG\n".repeat(5);
        assert_eq!(detect(Path::new("job.txt"), &script), DocType::Text);
    }

    #[test]
    fn test_sniff_needs_sixty_percent() {
        let mut text = "$ RUN PROG\n".repeat(20);
        text.push_str(&"plain prose\n".repeat(20));
        assert_eq!(detect(Path::new("job.log"), &text), DocType::Text);

        let mut text = "  $ RUN PROG\n".repeat(24);
        text.push_str(&"plain prose\n".repeat(16));
        assert_eq!(detect(Path::new("job.log"), &text), DocType::Dcl);
    }

    #[test]
    fn test_only_first_eighty_lines_count() {
        let mut text = "prose\n".repeat(80);
        text.push_str(&"$ RUN PROG\n".repeat(200));
        assert_eq!(detect(Path::new("notes"), &text), DocType::Text);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("a\nb\nc\n", 2), "a\nb");
        assert_eq!(preview("", 5), "");
    }
}
