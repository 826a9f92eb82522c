//! Literature Review - screening tool for bibliographic corpora.
//!
//! This library provides the core functionality for a systematic literature
//! review: bibliographic records exported from several databases are loaded
//! into one sparse table, duplicates are flagged by title, and a boolean
//! keyword query selects the relevant records.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (SourceEntry, Record, FlagCounts, etc.)
//! - **provider**: Record sources (RIS directories, static lists)
//! - **storage**: Corpus persistence (SQLite and in-memory) and id sequences
//! - **ingestion**: Schema discovery and record loading pipeline
//! - **query**: Keyword query compiler and predicate tree
//! - **filter**: Applies a compiled query and rewrites the match flags
//! - **dedup**: Title-based duplicate detection
//! - **summary**: Per-source and flag counts
//! - **config**: Run configuration with environment overrides
//!
//! # Workflow
//!
//! 1. Read RIS exports from `<base_dir>/<source>/*.ris`
//! 2. Discover the union of fields and build the corpus table
//! 3. Assign identifiers from a persisted sequence and insert the records
//! 4. Flag duplicate titles
//! 5. Compile the keyword query and flag the matching records
//! 6. Report the summary
//!
//! # Example
//!
//! ```rust
//! use literature_review::{
//!     filter::run_keyword_filter,
//!     models::Record,
//!     storage::memory::MemoryStore,
//! };
//! use std::collections::BTreeMap;
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("title".to_string(), "Blockchain basics".to_string());
//! let mut store = MemoryStore::with_records(vec![Record::new(1, "scopus", fields)]);
//!
//! let outcome = run_keyword_filter("(blockchain OR data_recovery)", &mut store).unwrap();
//! assert!(outcome.matched.contains(&1));
//! ```

// Public modules
pub mod config;
pub mod dedup;
pub mod filter;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod storage;
pub mod summary;

// Re-export commonly used types at the crate root
pub use config::{OutputFormat, ReviewConfig};
pub use models::{ColumnInfo, FlagCounts, Record, SourceEntry};
pub use provider::RecordProvider;
pub use query::{compile, KeywordQuery, QueryError};
pub use storage::{CorpusStore, SequenceGenerator};
pub use summary::{generate_summary, Summary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
