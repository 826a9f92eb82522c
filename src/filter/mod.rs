//! Keyword filter execution.
//!
//! Applies a compiled [`KeywordQuery`] to every stored record and rewrites the
//! keyword-match flags so that exactly the matching records are flagged. Each
//! run is a full re-evaluation: running the same query twice yields the same
//! flags, and a new query replaces the previous query's flags entirely.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::Record;
use crate::query::{compile, KeywordQuery, QueryError};
use crate::storage::{CorpusStore, StorageError};

/// Errors that can occur while filtering the corpus.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The query did not compile; no flags were touched
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Reading records or writing flags failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Outcome of one filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    /// Identifiers of the matching records
    pub matched: BTreeSet<i64>,

    /// Number of records the query was evaluated against
    pub evaluated: usize,
}

/// Evaluate a query against records without touching any store.
pub fn evaluate(query: &KeywordQuery, records: &[Record]) -> BTreeSet<i64> {
    records
        .iter()
        .filter(|record| query.matches(record))
        .map(|record| record.unique_id)
        .collect()
}

/// Apply a compiled query to the whole corpus and rewrite the match flags.
///
/// # Errors
/// Returns `FilterError::Storage` if records cannot be read or the flags
/// cannot be written
pub fn apply<S>(query: &KeywordQuery, store: &mut S) -> FilterResult<FilterOutcome>
where
    S: CorpusStore + ?Sized,
{
    let records = store.load_records()?;
    let matched = evaluate(query, &records);
    debug!(query = %query, matched = matched.len(), "evaluated keyword query");

    store.replace_keyword_matches(&matched)?;
    info!("{} of {} records match {}", matched.len(), records.len(), query);

    Ok(FilterOutcome {
        matched,
        evaluated: records.len(),
    })
}

/// Compile a raw query and apply it.
///
/// Compilation completes before the store is read, so a malformed query
/// leaves every flag untouched.
pub fn run_keyword_filter<S>(raw_query: &str, store: &mut S) -> FilterResult<FilterOutcome>
where
    S: CorpusStore + ?Sized,
{
    let query = compile(raw_query)?;
    apply(&query, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MalformedKind;
    use crate::storage::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn record(id: i64, pairs: &[(&str, &str)]) -> Record {
        let fields: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Record::new(id, "scopus", fields)
    }

    fn corpus() -> MemoryStore {
        MemoryStore::with_records(vec![
            record(1, &[("title", "Blockchain basics")]),
            record(2, &[("abstract", "no relation")]),
            record(3, &[("title", "Alpha study"), ("abstract", "beta results")]),
            record(4, &[("keywords", "Data Recovery, forensics")]),
        ])
    }

    fn flagged(store: &MemoryStore) -> BTreeSet<i64> {
        store
            .load_records()
            .unwrap()
            .into_iter()
            .filter(|r| r.is_keyword_match)
            .map(|r| r.unique_id)
            .collect()
    }

    #[test]
    fn test_apply_flags_exactly_the_matches() {
        let mut store = corpus();
        let outcome = run_keyword_filter("(blockchain OR data_recovery)", &mut store).unwrap();
        assert_eq!(outcome.matched, BTreeSet::from([1, 4]));
        assert_eq!(outcome.evaluated, 4);
        assert_eq!(flagged(&store), BTreeSet::from([1, 4]));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut store = corpus();
        let query = compile("(alpha AND beta)").unwrap();
        let first = apply(&query, &mut store).unwrap();
        let flags_first = flagged(&store);
        let second = apply(&query, &mut store).unwrap();
        assert_eq!(first, second);
        assert_eq!(flags_first, flagged(&store));
        assert_eq!(flags_first, BTreeSet::from([3]));
    }

    #[test]
    fn test_second_query_replaces_first() {
        let mut store = corpus();
        run_keyword_filter("(blockchain)", &mut store).unwrap();
        run_keyword_filter("(forensics)", &mut store).unwrap();
        assert_eq!(flagged(&store), BTreeSet::from([4]));
    }

    #[test]
    fn test_query_with_no_matches_clears_flags() {
        let mut store = corpus();
        run_keyword_filter("(blockchain)", &mut store).unwrap();
        let outcome = run_keyword_filter("(quantum)", &mut store).unwrap();
        assert!(outcome.matched.is_empty());
        assert!(flagged(&store).is_empty());
    }

    #[test]
    fn test_malformed_query_leaves_flags_untouched() {
        let mut store = corpus();
        run_keyword_filter("(blockchain)", &mut store).unwrap();
        let err = run_keyword_filter("(a OR )", &mut store).unwrap_err();
        match err {
            FilterError::Query(q) => assert_eq!(q.kind(), MalformedKind::EmptyTerm),
            other => panic!("expected query error, got {other:?}"),
        }
        assert_eq!(flagged(&store), BTreeSet::from([1]));
    }

    #[test]
    fn test_top_level_combinators() {
        let records = corpus().load_records().unwrap();
        let union = evaluate(&compile("(blockchain) OR (alpha)").unwrap(), &records);
        assert_eq!(union, BTreeSet::from([1, 3]));
        let intersection = evaluate(&compile("(alpha) AND (beta)").unwrap(), &records);
        assert_eq!(intersection, BTreeSet::from([3]));
        let empty = evaluate(&compile("(blockchain) AND (alpha)").unwrap(), &records);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_missing_fields_never_match() {
        let records = vec![record(1, &[("doi", "blockchain")]), record(2, &[])];
        let matched = evaluate(&compile("(blockchain)").unwrap(), &records);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_uninitialized_store_is_storage_error() {
        let mut store = MemoryStore::new();
        let err = run_keyword_filter("(x)", &mut store).unwrap_err();
        assert!(matches!(err, FilterError::Storage(StorageError::SchemaError(_))));
    }
}
