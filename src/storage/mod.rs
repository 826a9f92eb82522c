//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting the corpus: a single
//! table of records whose columns are discovered at ingestion time, plus the
//! fixed bookkeeping columns (`source`, `unique_id`, `is_duplicate`,
//! `is_keyword_match`). It also defines the identifier sequence the ingestion
//! pipeline draws from.

pub mod memory;
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::models::{ColumnInfo, FlagCounts, Record};

/// Name of the corpus table.
pub const ARTICLES_TABLE: &str = "articles";

/// Name of the sequence used for record identifiers.
pub const ARTICLE_ID_SEQUENCE: &str = "article_id_seq";

/// Bookkeeping columns present on every stored record.
pub const BOOKKEEPING_COLUMNS: [&str; 4] = ["source", "unique_id", "is_duplicate", "is_keyword_match"];

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store cannot be opened or written
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Schema error (missing table, reserved column name, etc.)
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Identifier already present in the store
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::QueryError(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for corpus storage backends.
///
/// Flag updates replace the whole flag column at once: every record's flag is
/// cleared and then set for exactly the given identifiers, as one logical
/// unit, so re-running a pass always restores a consistent state.
pub trait CorpusStore {
    /// Drop all stored state (records and sequences).
    fn reset(&mut self) -> StorageResult<()>;

    /// Create the corpus table with the given discovered fields.
    ///
    /// Idempotent. If the table already exists, missing field columns are
    /// added and existing ones are left untouched.
    ///
    /// # Errors
    /// Returns `StorageError::SchemaError` if a field name collides with a
    /// bookkeeping column
    fn initialize(&mut self, fields: &BTreeSet<String>) -> StorageResult<()>;

    /// Insert a record with an already assigned identifier.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if the identifier is taken
    fn insert_record(&mut self, record: &Record) -> StorageResult<()>;

    /// Load every record in identifier order.
    fn load_records(&self) -> StorageResult<Vec<Record>>;

    /// Clear every keyword-match flag, then set it for exactly `ids`.
    fn replace_keyword_matches(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()>;

    /// Clear every duplicate flag, then set it for exactly `ids`.
    fn replace_duplicates(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()>;

    /// Describe the columns of the corpus table.
    fn table_structure(&self) -> StorageResult<Vec<ColumnInfo>>;

    /// Number of records per source.
    fn source_counts(&self) -> StorageResult<BTreeMap<String, usize>>;

    /// Aggregate duplicate/match counts.
    fn flag_counts(&self) -> StorageResult<FlagCounts>;
}

/// Source of strictly increasing record identifiers.
///
/// Implementations backed by persistent state keep handing out fresh values
/// across process restarts, so identifiers stay unique across repeated
/// ingestion runs.
pub trait SequenceGenerator {
    /// Return the next identifier and advance the sequence.
    fn next_value(&mut self) -> StorageResult<i64>;
}

/// Reject field names that would shadow a bookkeeping column.
pub(crate) fn check_field_names(fields: &BTreeSet<String>) -> StorageResult<()> {
    for field in fields {
        if field.trim().is_empty() {
            return Err(StorageError::SchemaError("empty field name".to_string()));
        }
        if BOOKKEEPING_COLUMNS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(field))
        {
            return Err(StorageError::SchemaError(format!(
                "field '{}' collides with a bookkeeping column",
                field
            )));
        }
    }
    Ok(())
}

/// Quote an SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("title"), "\"title\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_check_field_names() {
        assert!(check_field_names(&names(&["title", "doi", "custom1"])).is_ok());
        assert!(matches!(
            check_field_names(&names(&["title", "Source"])),
            Err(StorageError::SchemaError(_))
        ));
        assert!(matches!(
            check_field_names(&names(&[" "])),
            Err(StorageError::SchemaError(_))
        ));
    }
}
