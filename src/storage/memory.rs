//! In-memory storage implementation.
//!
//! Keeps records in a `BTreeMap` keyed by identifier. Useful for tests and for
//! screening a corpus without touching disk.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    check_field_names, CorpusStore, SequenceGenerator, StorageError, StorageResult,
    BOOKKEEPING_COLUMNS,
};
use crate::models::{ColumnInfo, FlagCounts, Record};

/// In-memory corpus store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    fields: BTreeSet<String>,
    records: BTreeMap<i64, Record>,
    initialized: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an initialized store holding the given records.
    pub fn with_records(records: Vec<Record>) -> Self {
        let fields = records
            .iter()
            .flat_map(|r| r.fields.keys().cloned())
            .collect();
        let records = records.into_iter().map(|r| (r.unique_id, r)).collect();
        Self {
            fields,
            records,
            initialized: true,
        }
    }

    /// Borrow a record by identifier.
    pub fn get(&self, unique_id: i64) -> Option<&Record> {
        self.records.get(&unique_id)
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::SchemaError(
                "corpus table does not exist; rebuild the corpus first".to_string(),
            ))
        }
    }
}

impl CorpusStore for MemoryStore {
    fn reset(&mut self) -> StorageResult<()> {
        *self = Self::default();
        Ok(())
    }

    fn initialize(&mut self, fields: &BTreeSet<String>) -> StorageResult<()> {
        check_field_names(fields)?;
        self.fields.extend(fields.iter().cloned());
        self.initialized = true;
        Ok(())
    }

    fn insert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.ensure_initialized()?;
        if self.records.contains_key(&record.unique_id) {
            return Err(StorageError::DuplicateEntry(format!(
                "unique_id {} already stored",
                record.unique_id
            )));
        }
        if let Some(unknown) = record.fields.keys().find(|f| !self.fields.contains(*f)) {
            return Err(StorageError::SchemaError(format!("no such column: {}", unknown)));
        }
        self.records.insert(record.unique_id, record.clone());
        Ok(())
    }

    fn load_records(&self) -> StorageResult<Vec<Record>> {
        self.ensure_initialized()?;
        Ok(self.records.values().cloned().collect())
    }

    fn replace_keyword_matches(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()> {
        self.ensure_initialized()?;
        for (id, record) in self.records.iter_mut() {
            record.is_keyword_match = ids.contains(id);
        }
        Ok(())
    }

    fn replace_duplicates(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()> {
        self.ensure_initialized()?;
        for (id, record) in self.records.iter_mut() {
            record.is_duplicate = ids.contains(id);
        }
        Ok(())
    }

    fn table_structure(&self) -> StorageResult<Vec<ColumnInfo>> {
        self.ensure_initialized()?;
        let columns = self
            .fields
            .iter()
            .map(|f| (f.as_str(), "TEXT"))
            .chain(BOOKKEEPING_COLUMNS.iter().map(|c| {
                let decl = if *c == "source" { "TEXT" } else { "INTEGER" };
                (*c, decl)
            }))
            .enumerate()
            .map(|(cid, (name, decl))| ColumnInfo {
                cid: cid as i64,
                name: name.to_string(),
                decl_type: decl.to_string(),
                not_null: false,
                default_value: match name {
                    "is_duplicate" | "is_keyword_match" => Some("0".to_string()),
                    _ => None,
                },
                primary_key: name == "unique_id",
            })
            .collect();
        Ok(columns)
    }

    fn source_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        self.ensure_initialized()?;
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.source.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn flag_counts(&self) -> StorageResult<FlagCounts> {
        self.ensure_initialized()?;
        let records: Vec<Record> = self.records.values().cloned().collect();
        Ok(FlagCounts::from_records(&records))
    }
}

/// In-memory identifier sequence starting at a given value.
#[derive(Debug, Clone)]
pub struct MemorySequence {
    next: i64,
}

impl MemorySequence {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(next: i64) -> Self {
        Self { next }
    }
}

impl Default for MemorySequence {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGenerator for MemorySequence {
    fn next_value(&mut self) -> StorageResult<i64> {
        let value = self.next;
        self.next += 1;
        Ok(value)
    }
}
