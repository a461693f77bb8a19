//! # Retrofit
//!
//! Retrieval-augmented question answering over legacy source trees.
//!
//! Retrofit walks a directory of DCL command procedures, C sources, embedded
//! SQL modules and plain text, splits every file into line-addressable
//! chunks that follow the language's own structure (labels, functions,
//! statements, paragraphs) and indexes them in SQLite FTS5. Questions are
//! answered from the best-ranked chunks, each one cited by path and line
//! range.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ Source tree │──▶│ Detect + Decode  │──▶│  SQLite   │
//! │ .com .c .sql│   │ + Chunk (ingest) │   │   FTS5    │
//! └─────────────┘   └──────────────────┘   └─────┬─────┘
//!                                                │
//!                        ┌───────────────────────┤
//!                        ▼                       ▼
//!                  ┌───────────┐          ┌────────────┐
//!                  │ search /  │─────────▶│  answer    │
//!                  │ context   │          │ rules/LLM  │
//!                  └───────────┘          └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, chunks, hits and citations |
//! | [`detect`] | Document type detection |
//! | [`decode`] | Byte decoding with legacy code page fallback |
//! | [`chunk`] | Structure-aware chunkers and their registry |
//! | [`db`] / [`migrate`] | Store connection and schema |
//! | [`store`] | Transactional writes, FTS queries, pruning |
//! | [`ingest`] | Indexing pipeline |
//! | [`search`] | Query sanitizing and ranked search |
//! | [`get`] | Chunk lookup |
//! | [`context`] | Budgeted context assembly |
//! | [`answer`] | Rules and LLM answers |
//! | [`llm`] | Ollama client |
//! | [`server`] | JSON HTTP surface |
//! | [`stats`] | Index summary |
//! | [`config`] | TOML configuration |
//! | [`error`] | Library error type |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod decode;
pub mod detect;
pub mod error;
pub mod get;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
