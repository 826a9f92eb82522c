//! Boolean keyword query compiler.
//!
//! This module turns a bracketed AND/OR keyword expression such as
//!
//! ```text
//! [(blockchain OR data_recovery) AND (forensic OR integrity)]
//! ```
//!
//! into a typed [`KeywordQuery`] tree and evaluates it against records.
//!
//! # Semantics
//!
//! - A **term** matches a record when any of title, abstract or keywords
//!   contains it as a case-insensitive substring.
//! - A **group** combines its terms with a single combinator. If any
//!   `OR`-separated part of the group contains `AND`, the whole group uses AND.
//! - The **query** combines all groups with the first connective found between
//!   two groups, or AND when there is none.
//!
//! Missing fields never match. Empty terms are rejected at compile time, so a
//! compiled query never matches everything by accident.
//!
//! # Known limitations
//!
//! - A group mixing `AND` and `OR`, such as `(a OR b AND c)`, is treated as
//!   an AND of all its terms. A warning is logged.
//! - Connectives are recognized before underscores become spaces, so
//!   `(rock_and_roll)` is the single term `rock and roll`, not three AND-ed
//!   terms. Spell out `(rock AND roll)` to split it.
//! - `&&` and `||` are accepted as connectives both inside groups and between
//!   them, so `(x) || (y)` combines the groups with OR. Older query files that
//!   relied on symbols being ignored between groups (and defaulting to AND)
//!   must use `(x) (y)` or `(x) AND (y)` instead.
//!
//! # Usage
//!
//! ```rust
//! use literature_review::query::{compile, Combinator};
//!
//! let query = compile("(x) OR (y)").unwrap();
//! assert_eq!(query.combinator, Combinator::Or);
//! assert_eq!(query.groups.len(), 2);
//! ```

mod parser;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Record, SEARCH_FIELDS};

pub use parser::compile;

/// Kinds of malformed query input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// The query contains no parenthesized group
    NoGroups,
    /// A `(` appears inside a group
    NestedGroup,
    /// A group is opened but never closed
    UnclosedGroup,
    /// A `)` appears without a matching `(`
    UnmatchedParen,
    /// Text between two groups is not AND/OR
    UnknownConnective,
    /// Text appears before the first or after the last group
    StrayText,
    /// A keyword term is empty or whitespace-only
    EmptyTerm,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            MalformedKind::NoGroups => "no parenthesized group found",
            MalformedKind::NestedGroup => "nested parentheses are not supported",
            MalformedKind::UnclosedGroup => "group is never closed",
            MalformedKind::UnmatchedParen => "closing parenthesis without an open group",
            MalformedKind::UnknownConnective => "expected AND or OR between groups",
            MalformedKind::StrayText => "text outside of any group",
            MalformedKind::EmptyTerm => "empty keyword term",
        };
        f.write_str(message)
    }
}

/// Errors that can occur while compiling a keyword query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The query text cannot be compiled
    #[error("Malformed query: {kind} in '{fragment}'")]
    Malformed {
        kind: MalformedKind,
        /// The offending part of the input
        fragment: String,
    },
}

impl QueryError {
    pub(crate) fn malformed(kind: MalformedKind, fragment: impl Into<String>) -> Self {
        QueryError::Malformed {
            kind,
            fragment: fragment.into(),
        }
    }

    /// The kind of problem found in the input.
    pub fn kind(&self) -> MalformedKind {
        match self {
            QueryError::Malformed { kind, .. } => *kind,
        }
    }

    /// The offending part of the input.
    pub fn fragment(&self) -> &str {
        match self {
            QueryError::Malformed { fragment, .. } => fragment,
        }
    }
}

/// Result type for query compilation.
pub type QueryResult<T> = Result<T, QueryError>;

/// Boolean combinator joining terms within a group or groups within a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    /// Combine an iterator of match results.
    fn combine<I>(self, mut results: I) -> bool
    where
        I: Iterator<Item = bool>,
    {
        match self {
            Combinator::And => results.all(|matched| matched),
            Combinator::Or => results.any(|matched| matched),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("AND"),
            Combinator::Or => f.write_str("OR"),
        }
    }
}

/// One keyword checked as a case-insensitive substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Term {
    /// Keyword as written, with underscores replaced by spaces
    pub text: String,

    /// Lowercased keyword used for matching
    pub needle: String,
}

impl Term {
    pub(crate) fn new(text: String) -> Self {
        let needle = text.to_lowercase();
        Self { text, needle }
    }

    /// Whether a single field value contains this term.
    pub fn matches_value(&self, value: &str) -> bool {
        value.to_lowercase().contains(&self.needle)
    }

    /// Whether the term occurs in any of title, abstract or keywords.
    pub fn matches(&self, record: &Record) -> bool {
        SEARCH_FIELDS
            .iter()
            .filter_map(|field| record.field(field))
            .any(|value| self.matches_value(value))
    }
}

/// One parenthesized clause of a keyword query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub combinator: Combinator,
    pub terms: Vec<Term>,
}

impl Group {
    pub fn matches(&self, record: &Record) -> bool {
        self.combinator
            .combine(self.terms.iter().map(|term| term.matches(record)))
    }
}

/// A compiled keyword query: groups joined by one top-level combinator.
///
/// Built per invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordQuery {
    pub combinator: Combinator,
    pub groups: Vec<Group>,
}

impl KeywordQuery {
    /// Evaluate the query against one record.
    pub fn matches(&self, record: &Record) -> bool {
        self.combinator
            .combine(self.groups.iter().map(|group| group.matches(record)))
    }

    /// Total number of terms across all groups.
    pub fn term_count(&self) -> usize {
        self.groups.iter().map(|group| group.terms.len()).sum()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (idx, term) in self.terms.iter().enumerate() {
            if idx > 0 {
                write!(f, " {} ", self.combinator)?;
            }
            f.write_str(&term.text)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for KeywordQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, group) in self.groups.iter().enumerate() {
            if idx > 0 {
                write!(f, " {} ", self.combinator)?;
            }
            write!(f, "{}", group)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(id: i64, pairs: &[(&str, &str)]) -> Record {
        let fields: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Record::new(id, "scopus", fields)
    }

    #[test]
    fn test_term_matches_any_search_field() {
        let term = Term::new("ledger".to_string());
        assert!(term.matches(&record(1, &[("title", "Distributed LEDGER design")])));
        assert!(term.matches(&record(2, &[("abstract", "a ledger")])));
        assert!(term.matches(&record(3, &[("keywords", "Blockchain, Ledgers")])));
        assert!(!term.matches(&record(4, &[("doi", "ledger")])));
        assert!(!term.matches(&record(5, &[])));
    }

    #[test]
    fn test_term_matches_inside_words() {
        let term = Term::new("chain".to_string());
        assert!(term.matches(&record(1, &[("title", "Blockchain basics")])));
    }

    #[test]
    fn test_or_group_scenario() {
        let query = compile("(blockchain OR data_recovery)").unwrap();
        let a = record(1, &[("title", "Blockchain basics")]);
        let b = record(2, &[("abstract", "no relation")]);
        assert!(query.matches(&a));
        assert!(!query.matches(&b));
    }

    #[test]
    fn test_and_group_checks_each_term_across_fields() {
        let query = compile("(alpha AND beta)").unwrap();
        let split = record(1, &[("title", "Alpha study"), ("abstract", "about beta")]);
        let partial = record(2, &[("title", "alpha only")]);
        assert!(query.matches(&split));
        assert!(!query.matches(&partial));
    }

    #[test]
    fn test_top_level_or_unions_groups() {
        let query = compile("(x) OR (y)").unwrap();
        assert!(query.matches(&record(1, &[("title", "x marks")])));
        assert!(query.matches(&record(2, &[("keywords", "y")])));
        assert!(!query.matches(&record(3, &[("title", "none")])));
    }

    #[test]
    fn test_top_level_and_intersects_groups() {
        let query = compile("(x) AND (y)").unwrap();
        assert!(query.matches(&record(1, &[("title", "x"), ("abstract", "y")])));
        assert!(!query.matches(&record(2, &[("title", "x")])));
    }

    #[test]
    fn test_multi_word_term_matches_phrase_only() {
        let query = compile("(data_recovery)").unwrap();
        assert!(query.matches(&record(1, &[("abstract", "Fast data recovery tools")])));
        assert!(!query.matches(&record(2, &[("abstract", "data and recovery")])));
    }

    #[test]
    fn test_display_renders_canonical_form() {
        let query = compile("[(blockchain OR data_recovery) and (ledger)]").unwrap();
        assert_eq!(
            query.to_string(),
            "(blockchain OR data recovery) AND (ledger)"
        );
        assert_eq!(query.term_count(), 3);
    }

    #[test]
    fn test_error_message_names_fragment() {
        let err = compile("blockchain").unwrap_err();
        assert_eq!(err.kind(), MalformedKind::NoGroups);
        assert_eq!(err.fragment(), "blockchain");
        assert!(err.to_string().contains("'blockchain'"));
    }
}
