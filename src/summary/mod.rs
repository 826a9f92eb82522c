//! Corpus summary reporting.
//!
//! Aggregates record counts per source together with the duplicate and
//! keyword-match flags. This is a pure read of the store.

use std::fmt;

use serde::Serialize;

use crate::storage::{CorpusStore, StorageResult};

/// Record count of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
}

/// Summary of the corpus state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub per_source: Vec<SourceCount>,
    pub duplicates: usize,
    pub unique: usize,
    pub keyword_matches: usize,

    /// Keyword matches that are not duplicates
    pub relevant: usize,
}

/// Build a summary of the store.
///
/// `sources` are listed first, in order, with zero counts when absent; any
/// other source present in the store follows in name order.
pub fn generate_summary<S>(store: &S, sources: &[String]) -> StorageResult<Summary>
where
    S: CorpusStore + ?Sized,
{
    let flags = store.flag_counts()?;
    let mut counts = store.source_counts()?;

    let mut per_source: Vec<SourceCount> = sources
        .iter()
        .map(|source| SourceCount {
            source: source.clone(),
            count: counts.remove(source).unwrap_or(0),
        })
        .collect();
    per_source.extend(
        counts
            .into_iter()
            .map(|(source, count)| SourceCount { source, count }),
    );

    Ok(Summary {
        total: flags.total,
        per_source,
        duplicates: flags.duplicates,
        unique: flags.unique,
        keyword_matches: flags.keyword_matches,
        relevant: flags.relevant,
    })
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "Total Articles: {}", self.total)?;
        for entry in &self.per_source {
            writeln!(f, "Source: {}, Total Articles: {}", entry.source, entry.count)?;
        }
        writeln!(f, "Total Duplicates: {}", self.duplicates)?;
        writeln!(f, "Total Unique Articles: {}", self.unique)?;
        writeln!(f, "Total Keyword Matches: {}", self.keyword_matches)?;
        write!(f, "Relevant Articles: {}", self.relevant)
    }
}
