//! Answers built on top of an assembled context.
//!
//! Three modes share one retrieval step ([`build_context`]):
//!
//! - `context` returns the packed excerpts and their citations as-is;
//! - `rules` extracts per-type facts from each excerpt (DCL commands and
//!   labels, C call sites, SQL tables) and renders a numbered summary that
//!   only mentions what was extracted;
//! - `llm` sends a citation-instructed prompt to the generation endpoint.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::config::LlmConfig;
use crate::context::{build_context, ContextPack};
use crate::error::Result;
use crate::llm::OllamaClient;
use crate::models::{ChunkRecord, Citation, SearchHit};
use crate::search::SearchOptions;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    #[default]
    Context,
    Rules,
    Llm,
}

// ============ Feature extraction ============

static DCL_CMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*\$\s*(RUN|MCR|PIPE|SUBMIT|COPY|APPEND|RENAME|DELETE|PURGE|SET|ON|GOTO|CALL|@)\b(.*)$",
    )
    .unwrap()
});
static DCL_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\$([A-Za-z0-9_]+):[ \t]*$").unwrap());
static DCL_ON_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*\$[ \t]*ON[ \t]+ERROR\b(.*)$").unwrap());
static DCL_EXIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*\$[ \t]*(EXIT|STOP|LOGOUT)\b").unwrap());
static C_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap());
static SQL_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN|UPDATE|INTO)\s+([A-Za-z0-9_\.]+)").unwrap()
});

const C_NOT_CALLS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "typedef"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DclCommand {
    pub cmd: String,
    pub arg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DclFeatures {
    pub labels: Vec<String>,
    pub on_error: Vec<String>,
    pub exits: Vec<String>,
    pub commands: Vec<DclCommand>,
}

/// Facts pulled from one excerpt, by document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Features {
    Dcl(DclFeatures),
    C { top_calls: Vec<(String, usize)> },
    Sql { tables: Vec<String> },
    Text,
}

fn preview(s: &str, max: usize) -> String {
    s.trim().chars().take(max).collect()
}

pub fn extract_dcl(text: &str) -> DclFeatures {
    let labels = DCL_LABEL_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .take(50)
        .collect();
    let on_error = DCL_ON_ERROR_RE
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .take(20)
        .collect();
    let exits = DCL_EXIT_RE
        .captures_iter(text)
        .map(|c| c[1].to_uppercase())
        .take(20)
        .collect();
    let commands = DCL_CMD_RE
        .captures_iter(text)
        .map(|c| DclCommand {
            cmd: c[1].to_uppercase(),
            arg: preview(&c[2], 160),
        })
        .take(80)
        .collect();
    DclFeatures {
        labels,
        on_error,
        exits,
        commands,
    }
}

/// The 20 most called identifiers, by count then name.
pub fn extract_c_calls(text: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for caps in C_CALL_RE.captures_iter(text) {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if C_NOT_CALLS.contains(&name) || name.len() > 40 {
            continue;
        }
        *counts.entry(name).or_insert(0) += 1;
    }
    let mut top: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, n)| (name.to_string(), n))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(20);
    top
}

/// Distinct table names after FROM / JOIN / UPDATE / INTO, first spelling
/// kept, compared case-insensitively.
pub fn extract_sql_tables(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for caps in SQL_TABLE_RE.captures_iter(text) {
        let name = caps[1].trim().trim_end_matches(';');
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        tables.push(name.to_string());
        if tables.len() == 40 {
            break;
        }
    }
    tables
}

pub fn extract_features(doc_type: &str, text: &str) -> Features {
    match doc_type {
        "dcl" => Features::Dcl(extract_dcl(text)),
        "c" => Features::C {
            top_calls: extract_c_calls(text),
        },
        "sqlmod" => Features::Sql {
            tables: extract_sql_tables(text),
        },
        _ => Features::Text,
    }
}

/// Extracted facts for one cited excerpt.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFeatures {
    pub n: usize,
    pub path: String,
    pub doc_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub features: Features,
}

pub fn source_features(chunks: &[ChunkRecord]) -> Vec<SourceFeatures> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, r)| SourceFeatures {
            n: i + 1,
            path: r.path.clone(),
            doc_type: r.doc_type.clone(),
            start_line: r.start_line,
            end_line: r.end_line,
            features: extract_features(&r.doc_type, &r.text),
        })
        .collect()
}

fn list_with_more(items: &[String], shown: usize) -> String {
    let mut out = items.iter().take(shown).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > shown {
        out.push_str(" ...");
    }
    out
}

/// Renders the rules-mode summary.
pub fn render_rules(sources: &[SourceFeatures]) -> String {
    if sources.is_empty() {
        return NO_EXCERPTS.to_string();
    }

    let mut lines = vec!["Summary based only on the retrieved excerpts:".to_string()];
    for src in sources {
        lines.push(String::new());
        lines.push(format!(
            "[{}] {} ({}) lines {}-{}:",
            src.n, src.path, src.doc_type, src.start_line, src.end_line
        ));
        match &src.features {
            Features::Dcl(f) => {
                if !f.commands.is_empty() {
                    let mut verbs: Vec<&str> = f.commands.iter().map(|c| c.cmd.as_str()).collect();
                    verbs.sort_unstable();
                    verbs.dedup();
                    lines.push(format!("- DCL commands: {}", verbs.join(", ")));
                    for c in f.commands.iter().take(8) {
                        if c.arg.is_empty() {
                            lines.push(format!("  - {}", c.cmd));
                        } else {
                            lines.push(format!("  - {} {}", c.cmd, c.arg));
                        }
                    }
                }
                for handler in f.on_error.iter().take(3) {
                    lines.push(format!("- Error handling (ON ERROR): {}", handler));
                }
                if !f.exits.is_empty() {
                    let mut exits = f.exits.clone();
                    exits.sort();
                    exits.dedup();
                    lines.push(format!("- Exits (EXIT/STOP/LOGOUT): {}", exits.join(", ")));
                }
                if !f.labels.is_empty() {
                    lines.push(format!("- Labels: {}", list_with_more(&f.labels, 8)));
                }
            }
            Features::C { top_calls } => {
                if !top_calls.is_empty() {
                    lines.push("- Most frequent calls (indicative):".to_string());
                    for (name, count) in top_calls.iter().take(10) {
                        lines.push(format!("  - {} (x{})", name, count));
                    }
                }
            }
            Features::Sql { tables } => {
                if !tables.is_empty() {
                    lines.push(format!("- SQL tables/objects: {}", list_with_more(tables, 12)));
                }
            }
            Features::Text => {
                lines.push("- Text content available (no type-specific extraction).".to_string());
            }
        }
    }
    lines.join("\n")
}

// ============ LLM prompt ============

const NO_EXCERPTS: &str = "No relevant excerpts were found for this question.";

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a retro-documentation assistant for a legacy OpenVMS code base (C, SQLMOD, DCL).\n\
         Answer factually and concisely.\n\
         Cite your sources as [n], matching the numbered excerpts below.\n\
         If the excerpts do not contain the answer, say so plainly.\n\n\
         QUESTION:\n{}\n\n\
         EXCERPTS (numbered [n]):\n{}\n\n\
         ANSWER (with [n] citations):",
        question, context
    )
}

// ============ Entry point ============

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub mode: AnswerMode,
    pub answer: String,
    pub context: String,
    pub hits: Vec<SearchHit>,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub per_source: Vec<SourceFeatures>,
}

/// Retrieves, packs and answers `question` in `mode`.
///
/// `llm` mode skips the generation call when nothing was retrieved.
pub async fn answer(
    pool: &SqlitePool,
    question: &str,
    mode: AnswerMode,
    opts: &SearchOptions,
    max_context_chars: usize,
    llm: &LlmConfig,
) -> Result<Answer> {
    let pack = build_context(pool, question, opts, max_context_chars).await?;
    answer_from_pack(question, mode, pack, llm).await
}

pub async fn answer_from_pack(
    question: &str,
    mode: AnswerMode,
    pack: ContextPack,
    llm: &LlmConfig,
) -> Result<Answer> {
    let mut per_source = Vec::new();
    let text = match mode {
        AnswerMode::Context => pack.context.clone(),
        AnswerMode::Rules => {
            per_source = source_features(&pack.chunks);
            render_rules(&per_source)
        }
        AnswerMode::Llm if pack.context.is_empty() => NO_EXCERPTS.to_string(),
        AnswerMode::Llm => {
            let client = OllamaClient::new(llm)?;
            client.generate(&build_prompt(question, &pack.context)).await?
        }
    };

    Ok(Answer {
        question: question.to_string(),
        mode,
        answer: text,
        context: pack.context,
        hits: pack.hits,
        citations: pack.citations,
        per_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = "$ SET NOON\n$ ON ERROR THEN GOTO FAIL\n$START:\n$ RUN SYS$SYSTEM:LOADER\n$ @SETUP.COM\n$ COPY A.DAT B.DAT\n$ EXIT\n$FAIL:\n$ STOP";

    #[test]
    fn test_extract_dcl() {
        let f = extract_dcl(JOB);
        assert_eq!(f.labels, vec!["START", "FAIL"]);
        assert_eq!(f.on_error, vec!["THEN GOTO FAIL"]);
        assert_eq!(f.exits, vec!["EXIT", "STOP"]);
        let verbs: Vec<_> = f.commands.iter().map(|c| c.cmd.as_str()).collect();
        assert_eq!(verbs, vec!["SET", "ON", "RUN", "@", "COPY"]);
        assert_eq!(f.commands[2].arg, "SYS$SYSTEM:LOADER");
    }

    #[test]
    fn test_command_arg_preview_is_bounded() {
        let line = format!("$ RUN {}", "A".repeat(400));
        let f = extract_dcl(&line);
        assert_eq!(f.commands[0].arg.chars().count(), 160);
    }

    #[test]
    fn test_extract_c_calls() {
        let text = "int main() {\n  if (x) { log(1); }\n  log(2);\n  open(f);\n  while (y) {}\n  return sizeof(int);\n}";
        let calls = extract_c_calls(text);
        assert_eq!(calls[0], ("log".to_string(), 2));
        assert!(calls.contains(&("open".to_string(), 1)));
        assert!(calls.iter().all(|(n, _)| n != "if" && n != "while" && n != "sizeof"));
    }

    #[test]
    fn test_extract_sql_tables_dedupes() {
        let text = "SELECT a FROM orders o JOIN customers c ON 1=1;\nUPDATE ORDERS SET x = 1;\nINSERT INTO audit_log VALUES (1);";
        assert_eq!(extract_sql_tables(text), vec!["orders", "customers", "audit_log"]);
    }

    #[test]
    fn test_render_rules_mentions_only_extracted_items() {
        let sources = vec![SourceFeatures {
            n: 1,
            path: "/src/job.com".to_string(),
            doc_type: "dcl".to_string(),
            start_line: 1,
            end_line: 9,
            features: Features::Dcl(extract_dcl(JOB)),
        }];
        let text = render_rules(&sources);
        assert!(text.contains("[1] /src/job.com (dcl) lines 1-9:"));
        assert!(text.contains("- DCL commands: @, COPY, ON, RUN, SET"));
        assert!(text.contains("- Error handling (ON ERROR): THEN GOTO FAIL"));
        assert!(text.contains("- Exits (EXIT/STOP/LOGOUT): EXIT, STOP"));
        assert!(text.contains("- Labels: START, FAIL"));
    }

    #[test]
    fn test_render_rules_empty() {
        assert_eq!(render_rules(&[]), NO_EXCERPTS);
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt("What does LOADER do?", "[1] /a.com (dcl) lines 1-2\n$ RUN LOADER");
        assert!(prompt.contains("QUESTION:\nWhat does LOADER do?\n\n"));
        assert!(prompt.contains("EXCERPTS (numbered [n]):\n[1] /a.com"));
        assert!(prompt.ends_with("ANSWER (with [n] citations):"));
    }
}
