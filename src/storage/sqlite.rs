//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `CorpusStore`
//! trait using rusqlite, and the persisted identifier sequence.
//!
//! # Schema
//! The database contains two tables:
//! - `articles`: one `TEXT` column per discovered field plus `source TEXT`,
//!   `unique_id INTEGER PRIMARY KEY`, `is_duplicate INTEGER DEFAULT 0` and
//!   `is_keyword_match INTEGER DEFAULT 0`
//! - `sequences`: `(name TEXT PRIMARY KEY, next_val INTEGER)`

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    check_field_names, quote_identifier, CorpusStore, SequenceGenerator, StorageError,
    StorageResult, ARTICLES_TABLE,
};
use crate::models::{ColumnInfo, FlagCounts, Record};

/// SQLite-based corpus storage.
///
/// The connection is shared with [`SqliteSequence`] handles so the sequence
/// and the corpus live in the same database file.
pub struct SqliteStore {
    conn: Rc<Connection>,
}

/// Result of a passthrough diagnostics query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawRows {
    /// Column names of the result set (empty for statements without results)
    pub columns: Vec<String>,

    /// Rows rendered as text; SQL NULL is rendered as `NULL`
    pub rows: Vec<Vec<String>>,

    /// Rows changed by a statement without a result set
    pub affected: usize,
}

impl SqliteStore {
    /// Open (or create) a file-backed store.
    ///
    /// # Arguments
    /// * `path` - SQLite database file; created if it does not exist
    ///
    /// # Returns
    /// A store sharing its connection with every sequence handle it creates
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the file cannot be opened
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::ConnectionError(format!("{}: {}", path.display(), e))
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| {
                StorageError::ConnectionError(format!(
                    "{}: failed to set pragmas: {}",
                    path.display(),
                    e
                ))
            })?;
        debug!("Opened SQLite store at {}", path.display());
        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    /// Get a handle on a named persisted sequence, creating it if needed.
    ///
    /// New sequences start at 1.
    pub fn sequence(&self, name: &str) -> StorageResult<SqliteSequence> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sequences (name TEXT PRIMARY KEY, next_val INTEGER)",
            [],
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO sequences (name, next_val) VALUES (?1, 1)",
            params![name],
        )?;
        Ok(SqliteSequence {
            conn: Rc::clone(&self.conn),
            name: name.to_string(),
        })
    }

    /// Execute an arbitrary SQL statement for diagnostics.
    ///
    /// Statements producing a result set return their rows rendered as text;
    /// other statements return the number of changed rows.
    pub fn execute_raw(&self, sql: &str) -> StorageResult<RawRows> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        if columns.is_empty() {
            let affected = stmt.execute([])?;
            return Ok(RawRows {
                affected,
                ..RawRows::default()
            });
        }

        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut rendered = Vec::with_capacity(width);
            for idx in 0..width {
                rendered.push(render_value(row.get_ref(idx)?));
            }
            rows.push(rendered);
        }
        Ok(RawRows {
            columns,
            rows,
            affected: 0,
        })
    }

    fn table_exists(&self) -> StorageResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![ARTICLES_TABLE],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn require_table(&self) -> StorageResult<()> {
        if self.table_exists()? {
            Ok(())
        } else {
            Err(StorageError::SchemaError(format!(
                "table '{}' does not exist; rebuild the corpus first",
                ARTICLES_TABLE
            )))
        }
    }

    fn existing_columns(&self) -> StorageResult<BTreeSet<String>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(ARTICLES_TABLE));
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    fn replace_flag(&self, column: &str, ids: &BTreeSet<i64>) -> StorageResult<()> {
        self.require_table()?;
        let column = quote_identifier(column);
        let table = quote_identifier(ARTICLES_TABLE);

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&format!("UPDATE {table} SET {column} = 0"), [])?;
        {
            let mut stmt =
                tx.prepare(&format!("UPDATE {table} SET {column} = 1 WHERE unique_id = ?1"))?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl CorpusStore for SqliteStore {
    fn reset(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS articles;
             DROP TABLE IF EXISTS sequences;",
        )?;
        debug!("Dropped corpus and sequence tables");
        Ok(())
    }

    fn initialize(&mut self, fields: &BTreeSet<String>) -> StorageResult<()> {
        check_field_names(fields)?;
        let table = quote_identifier(ARTICLES_TABLE);

        if self.table_exists()? {
            let existing = self.existing_columns()?;
            for field in fields.iter().filter(|f| !existing.contains(*f)) {
                debug!("Adding column '{}' to {}", field, ARTICLES_TABLE);
                self.conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN {} TEXT", quote_identifier(field)),
                    [],
                )?;
            }
            return Ok(());
        }

        let mut columns: Vec<String> = fields
            .iter()
            .map(|f| format!("{} TEXT", quote_identifier(f)))
            .collect();
        columns.extend([
            "source TEXT".to_string(),
            "unique_id INTEGER PRIMARY KEY".to_string(),
            "is_duplicate INTEGER DEFAULT 0".to_string(),
            "is_keyword_match INTEGER DEFAULT 0".to_string(),
        ]);
        let sql = format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns.join(", "));
        self.conn.execute(&sql, [])?;
        debug!("Created {} with {} field columns", ARTICLES_TABLE, fields.len());
        Ok(())
    }

    fn insert_record(&mut self, record: &Record) -> StorageResult<()> {
        let mut columns: Vec<String> = record.fields.keys().map(|f| quote_identifier(f)).collect();
        columns.push("source".to_string());
        columns.push("unique_id".to_string());
        columns.push("is_duplicate".to_string());
        columns.push("is_keyword_match".to_string());

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(ARTICLES_TABLE),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut values: Vec<&dyn rusqlite::ToSql> =
            record.fields.values().map(|v| v as &dyn rusqlite::ToSql).collect();
        values.push(&record.source);
        values.push(&record.unique_id);
        values.push(&record.is_duplicate);
        values.push(&record.is_keyword_match);

        match self.conn.execute(&sql, values.as_slice()) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DuplicateEntry(format!(
                    "unique_id {} already stored",
                    record.unique_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_records(&self) -> StorageResult<Vec<Record>> {
        self.require_table()?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY unique_id",
            quote_identifier(ARTICLES_TABLE)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut records = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Record::new(0, String::new(), BTreeMap::new());
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get_ref(idx)?;
                match column.as_str() {
                    "unique_id" => record.unique_id = row.get(idx)?,
                    "source" => match value_as_text(value) {
                        Ok(text) => record.source = text.unwrap_or_default(),
                        Err(()) => warn!("undecodable source in record; reading it as empty"),
                    },
                    "is_duplicate" => record.is_duplicate = as_flag(value),
                    "is_keyword_match" => record.is_keyword_match = as_flag(value),
                    field => match value_as_text(value) {
                        Ok(Some(text)) => {
                            record.fields.insert(field.to_string(), text);
                        }
                        Ok(None) => {}
                        Err(()) => warn!(
                            field,
                            "skipping undecodable value in record; it cannot match"
                        ),
                    },
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn replace_keyword_matches(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()> {
        self.replace_flag("is_keyword_match", ids)
    }

    fn replace_duplicates(&mut self, ids: &BTreeSet<i64>) -> StorageResult<()> {
        self.replace_flag("is_duplicate", ids)
    }

    fn table_structure(&self) -> StorageResult<Vec<ColumnInfo>> {
        self.require_table()?;
        let sql = format!("PRAGMA table_info({})", quote_identifier(ARTICLES_TABLE));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    cid: row.get(0)?,
                    name: row.get(1)?,
                    decl_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default_value: row.get(4)?,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn source_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        self.require_table()?;
        let sql = format!(
            "SELECT COALESCE(source, ''), COUNT(*) FROM {} GROUP BY source",
            quote_identifier(ARTICLES_TABLE)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut counts = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (source, count) = row?;
            *counts.entry(source).or_insert(0) += count as usize;
        }
        Ok(counts)
    }

    fn flag_counts(&self) -> StorageResult<FlagCounts> {
        self.require_table()?;
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_duplicate = 1), 0),
                    COALESCE(SUM(is_duplicate = 0), 0),
                    COALESCE(SUM(is_keyword_match = 1), 0),
                    COALESCE(SUM(is_keyword_match = 1 AND is_duplicate = 0), 0)
             FROM {}",
            quote_identifier(ARTICLES_TABLE)
        );
        let counts = self.conn.query_row(&sql, [], |row| {
            Ok(FlagCounts {
                total: row.get::<_, i64>(0)? as usize,
                duplicates: row.get::<_, i64>(1)? as usize,
                unique: row.get::<_, i64>(2)? as usize,
                keyword_matches: row.get::<_, i64>(3)? as usize,
                relevant: row.get::<_, i64>(4)? as usize,
            })
        })?;
        Ok(counts)
    }
}

/// Persisted sequence stored in the `sequences` table.
pub struct SqliteSequence {
    conn: Rc<Connection>,
    name: String,
}

impl SqliteSequence {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SequenceGenerator for SqliteSequence {
    fn next_value(&mut self) -> StorageResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let value: i64 = tx
            .query_row(
                "SELECT next_val FROM sequences WHERE name = ?1",
                params![self.name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("sequence '{}'", self.name)))?;
        tx.execute(
            "UPDATE sequences SET next_val = next_val + 1 WHERE name = ?1",
            params![self.name],
        )?;
        tx.commit()?;
        Ok(value)
    }
}

fn as_flag(value: ValueRef<'_>) -> bool {
    match value {
        ValueRef::Integer(i) => i != 0,
        ValueRef::Real(f) => f != 0.0,
        ValueRef::Text(t) => t != b"0" && !t.is_empty(),
        ValueRef::Null | ValueRef::Blob(_) => false,
    }
}

/// Convert a cell to text. `Err` marks a value that cannot be decoded.
fn value_as_text(value: ValueRef<'_>) -> Result<Option<String>, ()> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        ValueRef::Real(f) => Ok(Some(f.to_string())),
        ValueRef::Text(t) | ValueRef::Blob(t) => std::str::from_utf8(t)
            .map(|s| Some(s.to_string()))
            .map_err(|_| ()),
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Text(b) | ValueRef::Blob(b) => match std::str::from_utf8(b) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<{} bytes>", b.len()),
        },
        other => value_as_text(other).ok().flatten().unwrap_or_default(),
    }
}
