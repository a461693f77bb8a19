//! Error types for Retrofit's library operations.

use std::path::PathBuf;

/// Errors raised by storage, indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error reading the source tree or the store file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of metadata.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The SQLite build has no FTS5 module.
    #[error("SQLite FTS5 is unavailable ({0}); use a SQLite build compiled with FTS5 support")]
    SearchUnavailable(String),

    /// Indexing root missing or not a directory.
    #[error("indexing root does not exist or is not a directory: {}", .0.display())]
    RootNotFound(PathBuf),

    /// File exceeds the configured byte ceiling.
    #[error("file too large ({size} bytes, limit {limit}): {}", .path.display())]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Unknown chunk id.
    #[error("chunk not found: {0}")]
    ChunkNotFound(i64),

    /// Generation endpoint failure.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
