//! Incremental indexing pipeline.
//!
//! Walks a root directory and, for each candidate file:
//!
//! 1. rejects it if it is larger than `max_file_bytes` (checked on metadata,
//!    before reading);
//! 2. hashes its bytes and compares with the stored hash for its `doc_id`
//!    (SHA-256 of the absolute path); an unchanged file stops here;
//! 3. decodes the bytes, detects the document type and chunks it;
//! 4. replaces the document and its chunks in one transaction.
//!
//! Every per-file failure becomes [`FileOutcome::Skipped`] and the run
//! continues. Only a missing root or an invalid exclude pattern aborts it.
//! Optionally, documents stored under the root whose file no longer exists
//! are pruned afterwards.

use anyhow::Result as AnyResult;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::ChunkerRegistry;
use crate::config::{Config, IndexingConfig};
use crate::db;
use crate::decode;
use crate::detect;
use crate::error::{Error, Result};
use crate::models::Document;
use crate::store;

/// Directories never indexed, whatever the configuration says.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// What to walk and which files to take.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub root: PathBuf,
    /// Lowercase extensions with a leading dot.
    pub include_extensions: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub max_file_bytes: u64,
    pub prune_missing: bool,
    pub follow_symlinks: bool,
}

impl IndexOptions {
    pub fn from_config(config: &IndexingConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_extensions: normalize_extensions(&config.include_extensions),
            exclude_globs: config.exclude_globs.clone(),
            max_file_bytes: config.max_file_bytes,
            prune_missing: config.prune_missing,
            follow_symlinks: config.follow_symlinks,
        }
    }
}

/// Counts for one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub scanned: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub pruned: u64,
    pub chunks_written: u64,
}

/// Result of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Updated { chunks: usize },
    Skipped { reason: String },
}

/// Lowercases, trims and dot-prefixes extensions; drops empties.
pub fn normalize_extensions<S: AsRef<str>>(exts: &[S]) -> Vec<String> {
    exts.iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty() && e != ".")
        .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
        .collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Stable document id: SHA-256 of the absolute path.
pub fn doc_id_for(path: &Path) -> String {
    sha256_hex(path.to_string_lossy().as_bytes())
}

/// Parent folder of `path` relative to `root`, `/`-separated, `""` at the root.
pub fn rel_folder(root: &Path, path: &Path) -> String {
    path.parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES.iter().copied().chain(patterns.iter().map(String::as_str)) {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid exclude globs: {}", e)))
}

fn has_included_extension(path: &Path, include: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .is_some_and(|ext| include.contains(&ext))
}

/// Candidate files under `root` in walk order (sorted by name per directory).
pub fn candidate_files(root: &Path, opts: &IndexOptions) -> Result<Vec<PathBuf>> {
    let excludes = build_globset(&opts.exclude_globs)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(opts.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if excludes.is_match(relative) {
            continue;
        }
        if !has_included_extension(path, &opts.include_extensions) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Indexes every candidate file under `opts.root`.
pub async fn index_root(
    pool: &SqlitePool,
    opts: &IndexOptions,
    registry: &ChunkerRegistry,
) -> Result<IndexReport> {
    let root = opts
        .root
        .canonicalize()
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| Error::RootNotFound(opts.root.clone()))?;

    tracing::info!(root = %root.display(), "indexing started");

    let files = candidate_files(&root, opts)?;
    let mut report = IndexReport::default();
    let mut seen = HashSet::with_capacity(files.len());

    for path in &files {
        report.scanned += 1;
        seen.insert(path.to_string_lossy().into_owned());

        match index_file(pool, registry, &root, path, opts.max_file_bytes).await {
            FileOutcome::Unchanged => report.unchanged += 1,
            FileOutcome::Updated { chunks } => {
                report.updated += 1;
                report.chunks_written += chunks as u64;
                tracing::debug!(path = %path.display(), chunks, "indexed");
                if report.updated % 50 == 0 {
                    tracing::info!(updated = report.updated, scanned = report.scanned, "progress");
                }
            }
            FileOutcome::Skipped { reason } => {
                report.skipped += 1;
                tracing::warn!(path = %path.display(), %reason, "skipped");
            }
        }
    }

    if opts.prune_missing {
        let prefix = format!("{}{}", root.display(), std::path::MAIN_SEPARATOR);
        report.pruned = store::prune_missing(pool, &prefix, &seen).await?;
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        unchanged = report.unchanged,
        skipped = report.skipped,
        pruned = report.pruned,
        "indexing finished"
    );

    Ok(report)
}

/// Indexes one file. Never fails; errors become [`FileOutcome::Skipped`].
pub async fn index_file(
    pool: &SqlitePool,
    registry: &ChunkerRegistry,
    root: &Path,
    path: &Path,
    max_file_bytes: u64,
) -> FileOutcome {
    match try_index_file(pool, registry, root, path, max_file_bytes).await {
        Ok(outcome) => outcome,
        Err(e) => FileOutcome::Skipped {
            reason: e.to_string(),
        },
    }
}

async fn try_index_file(
    pool: &SqlitePool,
    registry: &ChunkerRegistry,
    root: &Path,
    path: &Path,
    max_file_bytes: u64,
) -> Result<FileOutcome> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > max_file_bytes {
        return Err(Error::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_file_bytes,
        });
    }

    let bytes = std::fs::read(path)?;
    let file_hash = sha256_hex(&bytes);
    let doc_id = doc_id_for(path);
    if store::stored_hash(pool, &doc_id).await?.as_deref() == Some(file_hash.as_str()) {
        return Ok(FileOutcome::Unchanged);
    }

    let (text, encoding) = decode::decode(&bytes);
    drop(bytes);
    let doc_type = detect::detect(path, &detect::preview(&text, detect::PREVIEW_READ_LINES));

    let mut doc = Document::new(&doc_id, &path.to_string_lossy(), doc_type, text);
    doc.rel_folder = rel_folder(root, path);
    doc.meta
        .insert("source_root".to_string(), root.to_string_lossy().into_owned());
    doc.meta.insert(
        "filename".to_string(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    doc.meta
        .insert("encoding".to_string(), encoding.as_str().to_string());

    let chunks = registry.resolve(doc_type).chunk(&doc);

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    store::write_document(pool, &doc, &chunks, mtime, &file_hash).await?;

    Ok(FileOutcome::Updated {
        chunks: chunks.len(),
    })
}

/// CLI entry point for `retrofit index`.
pub async fn run_index(config: &Config, root: &Path) -> AnyResult<()> {
    let opts = IndexOptions::from_config(&config.indexing, root);
    let registry = config.chunking.registry();
    let pool = db::open(&config.db.path).await?;
    let report = index_root(&pool, &opts, &registry).await;
    pool.close().await;
    let report = report?;

    println!("index {}", root.display());
    println!("  scanned:   {}", report.scanned);
    println!("  updated:   {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped:   {}", report.skipped);
    if opts.prune_missing {
        println!("  pruned:    {}", report.pruned);
    }
    println!("  chunks written: {}", report.chunks_written);
    println!("ok");
    Ok(())
}
