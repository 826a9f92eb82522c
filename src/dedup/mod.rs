//! Duplicate detection.
//!
//! Records are grouped by their title, trimmed and lowercased. The first
//! record of each group in identifier order is canonical; every later record
//! with the same title is flagged as a duplicate. The DOI does not take part
//! in the key.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::models::Record;
use crate::storage::{CorpusStore, StorageResult};

/// Outcome of a duplicate detection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    /// Identifiers flagged as duplicates
    pub duplicates: BTreeSet<i64>,

    /// Records without a title; these are never flagged
    pub untitled: usize,
}

/// Normalized duplicate key of a title.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Find duplicates among records.
///
/// Records are visited in identifier order regardless of the input order.
pub fn find_duplicates(records: &[Record]) -> DedupOutcome {
    let mut ordered: Vec<&Record> = records.iter().collect();
    ordered.sort_by_key(|record| record.unique_id);

    let mut seen = HashSet::new();
    let mut outcome = DedupOutcome::default();
    for record in ordered {
        let Some(title) = record.title() else {
            outcome.untitled += 1;
            continue;
        };
        if !seen.insert(title_key(title)) {
            debug!(unique_id = record.unique_id, "duplicate title '{}'", title.trim());
            outcome.duplicates.insert(record.unique_id);
        }
    }
    outcome
}

/// Run duplicate detection over the whole corpus and rewrite the flags.
///
/// # Errors
/// Returns `StorageError` if records cannot be read or flags written
pub fn mark_duplicates<S>(store: &mut S) -> StorageResult<DedupOutcome>
where
    S: CorpusStore + ?Sized,
{
    let records = store.load_records()?;
    let outcome = find_duplicates(&records);
    store.replace_duplicates(&outcome.duplicates)?;
    info!(
        "Flagged {} duplicates among {} records ({} untitled)",
        outcome.duplicates.len(),
        records.len(),
        outcome.untitled
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn record(id: i64, title: Option<&str>, doi: Option<&str>) -> Record {
        let mut fields = BTreeMap::new();
        if let Some(title) = title {
            fields.insert("title".to_string(), title.to_string());
        }
        if let Some(doi) = doi {
            fields.insert("doi".to_string(), doi.to_string());
        }
        Record::new(id, "scopus", fields)
    }

    #[test]
    fn test_first_by_id_is_canonical() {
        let records = vec![
            record(3, Some("Blockchain Basics"), None),
            record(1, Some("  blockchain basics "), None),
            record(2, Some("BLOCKCHAIN BASICS"), None),
            record(4, Some("Something else"), None),
        ];
        let outcome = find_duplicates(&records);
        assert_eq!(outcome.duplicates, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_doi_is_not_part_of_key() {
        let records = vec![
            record(1, Some("Same"), Some("10.1/a")),
            record(2, Some("Same"), Some("10.1/b")),
        ];
        assert_eq!(find_duplicates(&records).duplicates, BTreeSet::from([2]));
    }

    #[test]
    fn test_inner_whitespace_is_significant() {
        let records = vec![
            record(1, Some("data recovery"), None),
            record(2, Some("data  recovery"), None),
        ];
        assert!(find_duplicates(&records).duplicates.is_empty());
    }

    #[test]
    fn test_untitled_records_are_never_duplicates() {
        let records = vec![record(1, None, None), record(2, None, None)];
        let outcome = find_duplicates(&records);
        assert!(outcome.duplicates.is_empty());
        assert_eq!(outcome.untitled, 2);
    }

    #[test]
    fn test_mark_duplicates_rewrites_flags() {
        let mut store = MemoryStore::with_records(vec![
            record(1, Some("A"), None),
            record(2, Some("a"), None),
            record(3, Some("B"), None),
        ]);
        store.replace_duplicates(&BTreeSet::from([3])).unwrap();

        let outcome = mark_duplicates(&mut store).unwrap();
        assert_eq!(outcome.duplicates, BTreeSet::from([2]));
        assert!(!store.get(1).unwrap().is_duplicate);
        assert!(store.get(2).unwrap().is_duplicate);
        assert!(!store.get(3).unwrap().is_duplicate);

        let again = mark_duplicates(&mut store).unwrap();
        assert_eq!(again, outcome);
    }
}
