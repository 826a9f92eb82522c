//! Review configuration.
//!
//! Holds the database location, the RIS base directory, the configured source
//! names and the preferred output format. Values can be loaded from
//! environment variables and overridden with the builder methods; the binary
//! applies its command-line flags on top.

use std::env;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

/// Default database file.
pub const DEFAULT_DB_PATH: &str = "literature_review.db";

/// Default sources, read from `<base_dir>/<source>/*.ris`.
pub const DEFAULT_SOURCES: [&str; 2] = ["scopus", "ieee"];

/// Errors raised by configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one source must be configured")]
    NoSources,

    #[error("Invalid source name '{0}'")]
    InvalidSource(String),

    #[error("Database path must not be empty")]
    EmptyDbPath,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum OutputFormat {
    /// Human-friendly tables
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

impl OutputFormat {
    /// Parse from a name (case-insensitive)
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "table" => Some(Self::Table),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration of a review run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Directory holding one sub-directory per source
    pub base_dir: PathBuf,

    /// Source names, in reporting order
    pub sources: Vec<String>,

    pub output_format: OutputFormat,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            base_dir: PathBuf::from("."),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            output_format: OutputFormat::Table,
        }
    }
}

impl ReviewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SLR_DB_PATH`: database file
    /// - `SLR_BASE_DIR`: RIS base directory
    /// - `SLR_SOURCES`: comma-separated source names
    /// - `SLR_OUTPUT_FORMAT`: `table` or `json`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SLR_DB_PATH").filter(|v| !v.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup("SLR_BASE_DIR").filter(|v| !v.trim().is_empty()) {
            config.base_dir = PathBuf::from(dir);
        }

        if let Some(sources) = lookup("SLR_SOURCES") {
            let parsed = split_sources(&sources);
            if !parsed.is_empty() {
                config.sources = parsed;
            }
        }

        if let Some(format) = lookup("SLR_OUTPUT_FORMAT") {
            if let Some(fmt) = OutputFormat::from_name(&format) {
                config.output_format = fmt;
            }
        }

        config
    }

    /// Builder: set database path
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Builder: set base directory
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Builder: replace the source list
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set output format
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDbPath);
        }

        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        // Source names become directory names under base_dir.
        for source in &self.sources {
            let bad = source.trim().is_empty()
                || source.contains(['/', '\\'])
                || source == "."
                || source == "..";
            if bad {
                return Err(ConfigError::InvalidSource(source.clone()));
            }
        }

        Ok(())
    }
}

fn split_sources(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ReviewConfig::default();
        assert_eq!(config.db_path, PathBuf::from("literature_review.db"));
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.sources, vec!["scopus", "ieee"]);
        assert_eq!(config.output_format, OutputFormat::Table);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_name("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_name(" JSON "), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name("yaml"), None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ReviewConfig::from_lookup(lookup_from(&[
            ("SLR_DB_PATH", "/tmp/review.db"),
            ("SLR_BASE_DIR", "data"),
            ("SLR_SOURCES", " acm , wos,,"),
            ("SLR_OUTPUT_FORMAT", "json"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/review.db"));
        assert_eq!(config.base_dir, PathBuf::from("data"));
        assert_eq!(config.sources, vec!["acm", "wos"]);
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = ReviewConfig::from_lookup(lookup_from(&[
            ("SLR_SOURCES", " , "),
            ("SLR_OUTPUT_FORMAT", "xml"),
            ("SLR_DB_PATH", ""),
        ]));
        assert_eq!(config, ReviewConfig::default());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ReviewConfig::new()
            .with_db_path("x.db")
            .with_base_dir("/data")
            .with_sources(["pubmed"])
            .with_output_format(OutputFormat::Json);
        assert_eq!(config.db_path, PathBuf::from("x.db"));
        assert_eq!(config.base_dir, PathBuf::from("/data"));
        assert_eq!(config.sources, vec!["pubmed"]);
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_validation() {
        let empty = ReviewConfig::new().with_sources(Vec::<String>::new());
        assert_eq!(empty.validate(), Err(ConfigError::NoSources));

        let nested = ReviewConfig::new().with_sources(["scopus/2023"]);
        assert_eq!(
            nested.validate(),
            Err(ConfigError::InvalidSource("scopus/2023".to_string()))
        );

        let parent = ReviewConfig::new().with_sources([".."]);
        assert!(parent.validate().is_err());

        let no_db = ReviewConfig::new().with_db_path("");
        assert_eq!(no_db.validate(), Err(ConfigError::EmptyDbPath));
    }
}
