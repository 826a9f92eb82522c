//! Core data models for the literature review corpus.
//!
//! This module contains the data structures shared across ingestion, storage,
//! filtering and reporting: the stored bibliographic record, the raw entry a
//! provider yields before an identifier is assigned, and schema/flag views
//! returned by the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field holding the record title.
pub const TITLE_FIELD: &str = "title";

/// Field holding the record abstract.
pub const ABSTRACT_FIELD: &str = "abstract";

/// Field holding the author-supplied keywords.
pub const KEYWORDS_FIELD: &str = "keywords";

/// Field holding the DOI.
pub const DOI_FIELD: &str = "doi";

/// Field holding the publication year.
pub const YEAR_FIELD: &str = "year";

/// Fields a keyword query is matched against.
pub const SEARCH_FIELDS: [&str; 3] = [TITLE_FIELD, ABSTRACT_FIELD, KEYWORDS_FIELD];

/// A raw entry as produced by a record provider.
///
/// Entries carry the originating source and the discovered fields but no
/// identifier; identifiers are assigned by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Name of the source collection the entry came from (e.g. "scopus")
    pub source: String,

    /// Field name to text value, as discovered in the export
    pub fields: BTreeMap<String, String>,
}

impl SourceEntry {
    /// Create a new entry for the given source.
    pub fn new(source: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            source: source.into(),
            fields,
        }
    }
}

/// One bibliographic record stored in the corpus.
///
/// The domain-specific fields form an open mapping because the field set is
/// only known after scanning the input. The bookkeeping attributes are typed
/// and present on every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Surrogate identifier assigned at ingestion (primary key)
    pub unique_id: i64,

    /// Source collection name
    pub source: String,

    /// Discovered fields; absent fields are simply missing from the map
    pub fields: BTreeMap<String, String>,

    /// Set by the duplicate detector
    pub is_duplicate: bool,

    /// Set by the keyword filter
    pub is_keyword_match: bool,
}

impl Record {
    /// Create a fresh record with both flags cleared.
    pub fn new(unique_id: i64, source: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            unique_id,
            source: source.into(),
            fields,
            is_duplicate: false,
            is_keyword_match: false,
        }
    }

    /// Build a record from a provider entry and an assigned identifier.
    pub fn from_entry(unique_id: i64, entry: SourceEntry) -> Self {
        Self::new(unique_id, entry.source, entry.fields)
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.field(TITLE_FIELD)
    }

    pub fn abstract_text(&self) -> Option<&str> {
        self.field(ABSTRACT_FIELD)
    }

    pub fn keywords(&self) -> Option<&str> {
        self.field(KEYWORDS_FIELD)
    }

    pub fn doi(&self) -> Option<&str> {
        self.field(DOI_FIELD)
    }

    pub fn year(&self) -> Option<&str> {
        self.field(YEAR_FIELD)
    }
}

/// One column of the corpus table, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column position
    pub cid: i64,

    /// Column name
    pub name: String,

    /// Declared SQL type
    pub decl_type: String,

    pub not_null: bool,

    /// Default value expression, if any
    pub default_value: Option<String>,

    pub primary_key: bool,
}

/// Aggregate flag counts over the whole corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub total: usize,
    pub duplicates: usize,
    pub unique: usize,
    pub keyword_matches: usize,

    /// Records that match the keyword query and are not duplicates
    pub relevant: usize,
}

impl FlagCounts {
    /// Compute counts from an in-memory slice of records.
    pub fn from_records(records: &[Record]) -> Self {
        let mut counts = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            if record.is_duplicate {
                counts.duplicates += 1;
            } else {
                counts.unique += 1;
            }
            if record.is_keyword_match {
                counts.keyword_matches += 1;
                if !record.is_duplicate {
                    counts.relevant += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_record_field_accessors() {
        let record = Record::new(
            7,
            "scopus",
            fields(&[("title", "Ledger recovery"), ("doi", "10.1/x")]),
        );
        assert_eq!(record.title(), Some("Ledger recovery"));
        assert_eq!(record.doi(), Some("10.1/x"));
        assert_eq!(record.abstract_text(), None);
        assert!(!record.is_duplicate);
        assert!(!record.is_keyword_match);
    }

    #[test]
    fn test_flag_counts_from_records() {
        let mut a = Record::new(1, "ieee", BTreeMap::new());
        a.is_keyword_match = true;
        let mut b = Record::new(2, "ieee", BTreeMap::new());
        b.is_keyword_match = true;
        b.is_duplicate = true;
        let c = Record::new(3, "scopus", BTreeMap::new());

        let counts = FlagCounts::from_records(&[a, b, c]);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.duplicates, 1);
        assert_eq!(counts.unique, 2);
        assert_eq!(counts.keyword_matches, 2);
        assert_eq!(counts.relevant, 1);
    }
}
