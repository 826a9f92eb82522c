//! Record provider module.
//!
//! This module defines the interface for sourcing raw bibliographic entries
//! and includes the RIS citation-export implementation.
//!
//! The `RecordProvider` trait abstracts the source of entry data, allowing the
//! ingestion pipeline to work with different export formats without coupling
//! to a specific one.

use thiserror::Error;

use crate::models::SourceEntry;

pub mod ris;

/// Errors that can occur when reading entries from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing raw entries.
///
/// # Design Notes
///
/// - Providers return entries without identifiers (identifiers are assigned
///   by the ingestion pipeline)
/// - Entries are not deduplicated; duplicate marking is a separate pass
pub trait RecordProvider {
    /// Fetch all available entries from this provider.
    ///
    /// # Errors
    /// Returns `ProviderError` if entries cannot be read or parsed
    fn fetch_entries(&self) -> ProviderResult<Vec<SourceEntry>>;

    /// Get the total count of entries available from this provider.
    ///
    /// The default implementation fetches everything and counts it.
    fn count_entries(&self) -> ProviderResult<usize> {
        self.fetch_entries().map(|entries| entries.len())
    }

    /// Human-readable name of this provider, for logging.
    fn name(&self) -> &str;
}

/// Provider over an in-memory list of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    entries: Vec<SourceEntry>,
}

impl StaticProvider {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        Self { entries }
    }
}

impl RecordProvider for StaticProvider {
    fn fetch_entries(&self) -> ProviderResult<Vec<SourceEntry>> {
        Ok(self.entries.clone())
    }

    fn count_entries(&self) -> ProviderResult<usize> {
        Ok(self.entries.len())
    }

    fn name(&self) -> &str {
        "static entries"
    }
}
