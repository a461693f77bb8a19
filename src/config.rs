//! TOML configuration parsing and validation.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! A configuration file itself is optional too: [`Config::default`] is a
//! complete, valid configuration and CLI flags override individual values.
//!
//! ```toml
//! [db]
//! path = "./data/retrofit.sqlite"
//!
//! [chunking]
//! plain_max_chars = 4500
//! dcl_min_lines = 8
//!
//! [indexing]
//! root = "/legacy/src"
//! include_extensions = [".com", ".c", ".sqlmod"]
//! prune_missing = true
//!
//! [retrieval]
//! max_context_chars = 18000
//!
//! [llm]
//! model = "llama3.1"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkerRegistry;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/retrofit.sqlite")
}

/// Size and shape limits for each chunker.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_plain_max_chars")]
    pub plain_max_chars: usize,
    #[serde(default = "default_dcl_min_lines")]
    pub dcl_min_lines: usize,
    #[serde(default = "default_dcl_max_lines")]
    pub dcl_max_lines: usize,
    #[serde(default = "default_plain_max_chars")]
    pub dcl_max_chars: usize,
    #[serde(default = "default_c_max_chars")]
    pub c_max_chars: usize,
    #[serde(default = "default_sql_max_lines")]
    pub sql_max_lines: usize,
    #[serde(default = "default_c_max_chars")]
    pub sql_fallback_max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            plain_max_chars: default_plain_max_chars(),
            dcl_min_lines: default_dcl_min_lines(),
            dcl_max_lines: default_dcl_max_lines(),
            dcl_max_chars: default_plain_max_chars(),
            c_max_chars: default_c_max_chars(),
            sql_max_lines: default_sql_max_lines(),
            sql_fallback_max_chars: default_c_max_chars(),
        }
    }
}

fn default_plain_max_chars() -> usize {
    4500
}
fn default_dcl_min_lines() -> usize {
    8
}
fn default_dcl_max_lines() -> usize {
    60
}
fn default_c_max_chars() -> usize {
    6500
}
fn default_sql_max_lines() -> usize {
    120
}

impl ChunkingConfig {
    /// Builds the chunker registry these limits describe.
    pub fn registry(&self) -> ChunkerRegistry {
        ChunkerRegistry::from_config(self)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Delete stored documents under the root whose file no longer exists.
    #[serde(default)]
    pub prune_missing: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_extensions: default_include_extensions(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
            prune_missing: false,
            follow_symlinks: false,
        }
    }
}

fn default_include_extensions() -> Vec<String> {
    [
        ".com", ".dcl", ".c", ".h", ".sql", ".sqlmod", ".sc", ".ddl", ".txt", ".md", ".rst",
        ".log", ".ini", ".cfg", ".conf", ".json", ".yaml", ".yml", ".csv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_bytes() -> u64 {
    20_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default = "default_context_top_k")]
    pub context_top_k: i64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_top_k: default_context_top_k(),
            max_context_chars: default_max_context_chars(),
            snippet_tokens: default_snippet_tokens(),
        }
    }
}

fn default_top_k() -> i64 {
    10
}
fn default_context_top_k() -> i64 {
    8
}
fn default_max_context_chars() -> usize {
    18_000
}
fn default_snippet_tokens() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_llm_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.1".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    /// Applies `RETROFIT_OLLAMA_URL` / `RETROFIT_OLLAMA_MODEL` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("RETROFIT_OLLAMA_URL") {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("RETROFIT_OLLAMA_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

/// Reads and validates a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks the invariants the chunkers and retrieval rely on.
pub fn validate(config: &Config) -> Result<()> {
    let c = &config.chunking;
    if c.plain_max_chars == 0
        || c.dcl_max_chars == 0
        || c.c_max_chars == 0
        || c.sql_fallback_max_chars == 0
    {
        anyhow::bail!("chunking character ceilings must be > 0");
    }
    if c.dcl_min_lines == 0 || c.dcl_max_lines == 0 || c.sql_max_lines == 0 {
        anyhow::bail!("chunking line limits must be > 0");
    }
    if c.dcl_min_lines > c.dcl_max_lines {
        anyhow::bail!("chunking.dcl_min_lines must be <= chunking.dcl_max_lines");
    }

    if config.indexing.max_file_bytes == 0 {
        anyhow::bail!("indexing.max_file_bytes must be > 0");
    }

    let r = &config.retrieval;
    if r.top_k < 1 || r.context_top_k < 1 {
        anyhow::bail!("retrieval.top_k and retrieval.context_top_k must be >= 1");
    }
    if r.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }

    Ok(())
}
