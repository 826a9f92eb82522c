//! Ingestion pipeline module.
//!
//! This module loads raw entries from a provider, discovers the union of their
//! field names, builds (or extends) the corpus schema, assigns identifiers
//! from an injected sequence and persists the records.
//!
//! # Usage
//!
//! ```rust
//! use literature_review::ingestion::IngestionPipeline;
//! use literature_review::provider::StaticProvider;
//! use literature_review::storage::memory::{MemorySequence, MemoryStore};
//!
//! let mut pipeline = IngestionPipeline::new(MemoryStore::new(), MemorySequence::new());
//! let stats = pipeline
//!     .ingest_from_provider(&StaticProvider::new(Vec::new()), |_| {})
//!     .unwrap();
//! assert_eq!(stats.inserted, 0);
//! ```
//!
//! Identifiers come from the sequence, never from the store, so a persisted
//! sequence keeps them unique across repeated runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Record, SourceEntry};
use crate::provider::{ProviderError, RecordProvider};
use crate::storage::{CorpusStore, SequenceGenerator, StorageError};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Identifier sequence failed
    #[error("Sequence error: {0}")]
    SequenceError(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    /// Total number of entries processed
    pub total_processed: usize,

    /// Number of records successfully inserted
    pub inserted: usize,

    /// Number of records that failed to insert
    pub failed: usize,

    /// Inserted records per source
    pub per_source: BTreeMap<String, usize>,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful insertion.
    pub fn record_inserted(&mut self, source: &str) {
        self.total_processed += 1;
        self.inserted += 1;
        *self.per_source.entry(source.to_string()).or_insert(0) += 1;
    }

    /// Record a failed insertion.
    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }
}

/// Union of all field names across entries.
pub fn discover_fields(entries: &[SourceEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.fields.keys().cloned())
        .collect()
}

/// Ingestion pipeline coordinator.
///
/// Owns the store and the identifier sequence for the duration of a run; use
/// [`IngestionPipeline::into_store`] to get the store back afterwards.
pub struct IngestionPipeline<S, G>
where
    S: CorpusStore,
    G: SequenceGenerator,
{
    store: S,
    sequence: G,
}

impl<S, G> IngestionPipeline<S, G>
where
    S: CorpusStore,
    G: SequenceGenerator,
{
    /// Create a pipeline over a store and an identifier sequence.
    ///
    /// # Arguments
    /// * `store` - Corpus store that receives the records; created or extended on ingest
    /// * `sequence` - Source of record identifiers, usually persisted next to the store
    pub fn new(store: S, sequence: G) -> Self {
        Self { store, sequence }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Finish the run and hand the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Ingest a batch of entries.
    ///
    /// This method:
    /// 1. Discovers the union of field names across `entries`
    /// 2. Creates the corpus table, or adds the missing columns
    /// 3. Draws one identifier per entry and inserts the record
    ///
    /// # Arguments
    /// * `entries` - Raw entries tagged with their source
    /// * `on_progress` - Called with the running statistics after each entry
    ///
    /// # Returns
    /// Statistics about the ingestion run
    ///
    /// # Errors
    /// Returns `IngestionError` if the schema cannot be created or the
    /// sequence fails. Individual insert failures are logged and counted in
    /// `IngestionStats::failed` instead.
    pub fn ingest_entries<F>(
        &mut self,
        entries: Vec<SourceEntry>,
        mut on_progress: F,
    ) -> IngestionResult<IngestionStats>
    where
        F: FnMut(&IngestionStats),
    {
        let fields = discover_fields(&entries);
        debug!("Discovered {} fields across {} entries", fields.len(), entries.len());
        self.store.initialize(&fields)?;

        let mut stats = IngestionStats::new();
        for entry in entries {
            let unique_id = self
                .sequence
                .next_value()
                .map_err(|e| IngestionError::SequenceError(e.to_string()))?;
            let record = Record::from_entry(unique_id, entry);

            match self.store.insert_record(&record) {
                Ok(()) => stats.record_inserted(&record.source),
                Err(e) => {
                    warn!(
                        unique_id,
                        source = %record.source,
                        "Failed to insert record '{}': {}",
                        record.title().unwrap_or("<untitled>"),
                        e
                    );
                    stats.record_failed();
                }
            }
            on_progress(&stats);
        }

        info!(
            "Ingested {} records ({} failed)",
            stats.inserted, stats.failed
        );
        Ok(stats)
    }

    /// Ingest every entry a provider yields.
    ///
    /// # Arguments
    /// * `provider` - Source of the raw entries
    /// * `on_progress` - Called with the running statistics after each entry
    ///
    /// # Returns
    /// Statistics about the ingestion run
    ///
    /// # Errors
    /// Returns `IngestionError` if the provider fails or the batch cannot be
    /// processed
    pub fn ingest_from_provider<P, F>(
        &mut self,
        provider: &P,
        on_progress: F,
    ) -> IngestionResult<IngestionStats>
    where
        P: RecordProvider + ?Sized,
        F: FnMut(&IngestionStats),
    {
        let entries = provider.fetch_entries()?;
        info!("Fetched {} entries from {}", entries.len(), provider.name());
        self.ingest_entries(entries, on_progress)
    }
}
