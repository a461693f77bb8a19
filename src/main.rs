//! # Retrofit CLI (`retrofit`)
//!
//! Indexes a legacy source tree (DCL command procedures, C, embedded SQL,
//! plain text) into a local SQLite store and answers questions over it with
//! line-accurate citations.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `retrofit init` | Create the SQLite store and schema |
//! | `retrofit index --root DIR` | Walk, chunk and index a source tree |
//! | `retrofit query "<q>"` | Ranked chunks with line ranges |
//! | `retrofit get <id>` | One chunk with its document fields |
//! | `retrofit explain "<question>"` | Context, rules or LLM answer with citations |
//! | `retrofit stats` | Document and chunk counts per type |
//! | `retrofit serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! retrofit index --root /legacy/src --prune
//! retrofit query "backup tape" --type dcl --scope jobs/nightly
//! retrofit explain "what happens when the nightly load fails?" --mode rules
//! retrofit explain "which tables does the loader touch?" --mode llm --model llama3.1
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use retrofit::answer::{self, AnswerMode};
use retrofit::config::{self, Config};
use retrofit::context;
use retrofit::db;
use retrofit::get;
use retrofit::ingest;
use retrofit::models::DocType;
use retrofit::search::{self, OutputFormat, SearchOptions};
use retrofit::server;
use retrofit::stats;

/// Retrofit: question answering over legacy source trees.
///
/// Configuration is optional. Without `--config` the built-in defaults are
/// used; command-line flags override either.
#[derive(Parser)]
#[command(
    name = "retrofit",
    about = "Retrieval-augmented question answering over legacy source trees",
    version
)]
struct Cli {
    /// Path to a configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite store path; overrides `[db] path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and schema. Safe to run repeatedly.
    Init,

    /// Index a source tree.
    ///
    /// Unchanged files (same SHA-256) are skipped; changed files have all of
    /// their chunks replaced in one transaction.
    Index {
        /// Root directory; defaults to `[indexing] root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Comma-separated extensions to include, e.g. `.com,.c,.sqlmod`.
        #[arg(long, value_delimiter = ',')]
        include_exts: Vec<String>,

        /// Remove stored documents under the root whose file is gone.
        #[arg(long)]
        prune: bool,
    },

    /// Search the index.
    Query {
        query: String,

        #[arg(long)]
        top_k: Option<i64>,

        /// Restrict to one document type: text, dcl, c, sqlmod.
        #[arg(long = "type")]
        doc_type: Option<DocType>,

        /// Folder below the indexed root, e.g. `jobs/nightly`.
        #[arg(long)]
        scope: Option<String>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Print one chunk by id.
    Get {
        id: i64,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Answer a question from the indexed sources.
    ///
    /// `context` prints the cited excerpts, `rules` summarizes what was
    /// extracted from them, `llm` asks the configured Ollama model.
    Explain {
        question: String,

        #[arg(long, value_enum, default_value_t)]
        mode: AnswerMode,

        #[arg(long)]
        top_k: Option<i64>,

        #[arg(long = "type")]
        doc_type: Option<DocType>,

        #[arg(long)]
        scope: Option<String>,

        #[arg(long)]
        max_context_chars: Option<usize>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        timeout_secs: Option<u64>,

        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show document and chunk counts.
    Stats {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Start the JSON HTTP server.
    Serve,
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "retrofit=info" };
    let filter = if quiet {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn load(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(db) = &cli.db {
        cfg.db.path = db.clone();
    }
    cfg.llm = cfg.llm.with_env_overrides();
    Ok(cfg)
}

fn search_options(
    top_k: i64,
    doc_type: Option<DocType>,
    scope: Option<&str>,
    cfg: &Config,
) -> Result<SearchOptions> {
    if top_k < 1 {
        bail!("--top-k must be >= 1");
    }
    Ok(SearchOptions::new(top_k)
        .with_doc_type(doc_type)
        .with_scope(scope)
        .with_snippet_tokens(cfg.retrieval.snippet_tokens))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    let mut cfg = load(&cli)?;

    match cli.command {
        Commands::Init => {
            let pool = db::open(&cfg.db.path).await?;
            pool.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index {
            root,
            include_exts,
            prune,
        } => {
            let Some(root) = root.or_else(|| cfg.indexing.root.clone()) else {
                bail!("no root to index: pass --root or set [indexing] root");
            };
            if !include_exts.is_empty() {
                cfg.indexing.include_extensions = include_exts;
            }
            if prune {
                cfg.indexing.prune_missing = true;
            }
            ingest::run_index(&cfg, &root).await?;
        }
        Commands::Query {
            query,
            top_k,
            doc_type,
            scope,
            format,
        } => {
            let opts = search_options(
                top_k.unwrap_or(cfg.retrieval.top_k),
                doc_type,
                scope.as_deref(),
                &cfg,
            )?;
            search::run_query(&cfg, &query, &opts, format).await?;
        }
        Commands::Get { id, format } => {
            get::run_get(&cfg, id, format).await?;
        }
        Commands::Explain {
            question,
            mode,
            top_k,
            doc_type,
            scope,
            max_context_chars,
            model,
            base_url,
            timeout_secs,
            format,
        } => {
            let opts = search_options(
                top_k.unwrap_or(cfg.retrieval.context_top_k),
                doc_type,
                scope.as_deref(),
                &cfg,
            )?;
            let max_chars = max_context_chars.unwrap_or(cfg.retrieval.max_context_chars);
            if max_chars == 0 {
                bail!("--max-context-chars must be > 0");
            }
            if let Some(model) = model {
                cfg.llm.model = model;
            }
            if let Some(base_url) = base_url {
                cfg.llm.base_url = base_url;
            }
            if let Some(timeout) = timeout_secs {
                if timeout == 0 {
                    bail!("--timeout-secs must be > 0");
                }
                cfg.llm.timeout_secs = timeout;
            }

            let pack = context::build_context_for(&cfg, &question, &opts, max_chars).await?;
            if mode == AnswerMode::Context {
                context::print_pack(&question, &pack, format)?;
                return Ok(());
            }

            let result = answer::answer_from_pack(&question, mode, pack, &cfg.llm).await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.answer);
                if !result.citations.is_empty() {
                    println!();
                    context::print_citations(&result.citations);
                }
            }
        }
        Commands::Stats { format } => {
            stats::run_stats(&cfg, format).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
