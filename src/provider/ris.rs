//! RIS citation-export provider.
//!
//! RIS is the tagged export format offered by Scopus, IEEE Xplore and most
//! reference managers. Each line carries a two-character tag:
//!
//! ```text
//! TY  - JOUR
//! TI  - Blockchain basics
//! AU  - Doe, Jane
//! AU  - Roe, Rick
//! KW  - ledger
//! ER  -
//! ```
//!
//! `TY` opens a record and `ER` closes it. Lines without a tag continue the
//! previous value. Repeated tags are joined with `", "`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{ProviderError, ProviderResult, RecordProvider};
use crate::models::SourceEntry;

static TAG_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9]) {1,2}-(?: (.*))?$").expect("valid RIS tag pattern"));

/// Separator used when a tag occurs more than once in a record.
const REPEAT_SEPARATOR: &str = ", ";

/// Map a RIS tag to the field name it is stored under.
///
/// Unknown tags are stored under their lowercase tag.
pub fn field_name_for_tag(tag: &str) -> String {
    let name = match tag {
        "TY" => "type_of_reference",
        "A1" => "first_authors",
        "A2" => "secondary_authors",
        "A3" => "tertiary_authors",
        "A4" => "subsidiary_authors",
        "AB" => "abstract",
        "AD" => "author_address",
        "AN" => "accession_number",
        "AU" => "authors",
        "C1" => "custom1",
        "C2" => "custom2",
        "C3" => "custom3",
        "C4" => "custom4",
        "C5" => "custom5",
        "C6" => "custom6",
        "C7" => "custom7",
        "C8" => "custom8",
        "CA" => "caption",
        "CN" => "call_number",
        "CY" => "place_published",
        "DA" => "date",
        "DB" => "name_of_database",
        "DO" => "doi",
        "DP" => "database_provider",
        "EP" => "end_page",
        "ET" => "edition",
        "ID" => "id",
        "IS" => "number",
        "J2" => "alternate_title1",
        "JA" => "alternate_title2",
        "JF" => "alternate_title3",
        "JO" => "journal_name",
        "KW" => "keywords",
        "L1" => "file_attachments1",
        "L2" => "file_attachments2",
        "L4" => "figure",
        "LA" => "language",
        "LB" => "label",
        "M1" => "note",
        "M3" => "type_of_work",
        "N1" => "notes",
        "N2" => "notes_abstract",
        "NV" => "number_of_volumes",
        "OP" => "original_publication",
        "PB" => "publisher",
        "PY" => "year",
        "RI" => "reviewed_item",
        "RN" => "research_notes",
        "RP" => "reprint_edition",
        "SE" => "section",
        "SN" => "issn",
        "SP" => "start_page",
        "ST" => "short_title",
        "T1" => "primary_title",
        "T2" => "secondary_title",
        "T3" => "tertiary_title",
        "TA" => "translated_author",
        "TI" => "title",
        "TT" => "translated_title",
        "UR" => "urls",
        "VL" => "volume",
        "Y1" => "publication_year",
        "Y2" => "access_date",
        other => return other.to_ascii_lowercase(),
    };
    name.to_string()
}

/// Fields of a record still being read.
#[derive(Default)]
struct OpenRecord {
    values: BTreeMap<String, Vec<String>>,
    last: Option<String>,
}

impl OpenRecord {
    fn push(&mut self, tag: &str, value: &str) {
        let name = field_name_for_tag(tag);
        self.values
            .entry(name.clone())
            .or_default()
            .push(value.to_string());
        self.last = Some(name);
    }

    fn continue_last(&mut self, text: &str) {
        let Some(last) = self
            .last
            .as_ref()
            .and_then(|name| self.values.get_mut(name))
            .and_then(|values| values.last_mut())
        else {
            return;
        };
        if !last.is_empty() {
            last.push(' ');
        }
        last.push_str(text);
    }

    fn finish(self) -> BTreeMap<String, String> {
        self.values
            .into_iter()
            .filter_map(|(name, values)| {
                let joined = values
                    .into_iter()
                    .filter(|v| !v.is_empty())
                    .collect::<Vec<_>>()
                    .join(REPEAT_SEPARATOR);
                (!joined.is_empty()).then_some((name, joined))
            })
            .collect()
    }
}

/// Parse RIS text into field mappings.
///
/// `origin` names the input in error messages (usually the file path).
///
/// # Errors
/// Returns `ProviderError::ParseError` if a tag other than `TY` appears
/// outside of a record.
pub fn parse_ris(text: &str, origin: &str) -> ProviderResult<Vec<BTreeMap<String, String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut entries = Vec::new();
    let mut current: Option<OpenRecord> = None;

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end();
        let Some(caps) = TAG_LINE.captures(line) else {
            let content = line.trim();
            if content.is_empty() {
                continue;
            }
            match current.as_mut() {
                Some(record) => record.continue_last(content),
                None => debug!(origin, line = idx + 1, "ignoring text outside of a record"),
            }
            continue;
        };

        let tag = caps.get(1).map_or("", |m| m.as_str());
        let value = caps.get(2).map_or("", |m| m.as_str()).trim();
        match tag {
            "TY" => {
                if let Some(open) = current.take() {
                    warn!(origin, line = idx + 1, "record not closed with ER before next TY");
                    entries.push(open.finish());
                }
                let mut record = OpenRecord::default();
                record.push(tag, value);
                current = Some(record);
            }
            "ER" => match current.take() {
                Some(record) => entries.push(record.finish()),
                None => warn!(origin, line = idx + 1, "ER without an open record"),
            },
            _ => match current.as_mut() {
                Some(record) => record.push(tag, value),
                None => {
                    return Err(ProviderError::ParseError(format!(
                        "{}:{}: tag {} appears before TY",
                        origin,
                        idx + 1,
                        tag
                    )));
                }
            },
        }
    }

    if let Some(open) = current {
        warn!(origin, "last record not closed with ER; keeping it");
        entries.push(open.finish());
    }
    Ok(entries)
}

/// Provider reading `*.ris` files from one directory per source.
///
/// Entries from `<base_dir>/<source>/*.ris` are tagged with `source`. Files
/// are read in file-name order.
#[derive(Debug, Clone)]
pub struct RisDirectoryProvider {
    base_dir: PathBuf,
    sources: Vec<String>,
}

impl RisDirectoryProvider {
    /// Create a provider over `<base_dir>/<source>` directories.
    ///
    /// # Arguments
    /// * `base_dir` - Directory holding one sub-directory per source
    /// * `sources` - Source names; each becomes the `source` of its entries
    pub fn new(base_dir: impl Into<PathBuf>, sources: Vec<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            sources,
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// List the RIS files of one source, sorted by name.
    ///
    /// Returns an empty list when the source directory does not exist.
    pub fn source_files(&self, source: &str) -> ProviderResult<Vec<PathBuf>> {
        let dir = self.base_dir.join(source);
        if !dir.is_dir() {
            warn!("Source directory {} not found; skipping", dir.display());
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "ris") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(path: &Path) -> ProviderResult<String> {
        fs::read_to_string(path).map_err(|e| {
            ProviderError::IoError(io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })
    }
}

impl RecordProvider for RisDirectoryProvider {
    fn fetch_entries(&self) -> ProviderResult<Vec<SourceEntry>> {
        if self.sources.is_empty() {
            return Err(ProviderError::ConfigError(
                "no source directories configured".to_string(),
            ));
        }
        let mut entries = Vec::new();
        for source in &self.sources {
            let before = entries.len();
            for path in self.source_files(source)? {
                let text = Self::read_file(&path)?;
                let parsed = parse_ris(&text, &path.display().to_string())?;
                debug!("Parsed {} entries from {}", parsed.len(), path.display());
                entries.extend(
                    parsed
                        .into_iter()
                        .map(|fields| SourceEntry::new(source.clone(), fields)),
                );
            }
            info!("Source '{}': {} entries", source, entries.len() - before);
        }
        Ok(entries)
    }

    fn name(&self) -> &str {
        "RIS source directories"
    }
}
