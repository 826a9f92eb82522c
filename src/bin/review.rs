//! Review binary entry point.
//!
//! This binary drives a literature review over a SQLite corpus: it rebuilds the
//! corpus from RIS exports, flags duplicates, runs keyword queries and prints
//! the summary. Several steps can be combined in one invocation; they run in
//! the order clear, overwrite, table structure, duplicates, keywords, query,
//! interactive.
//!
//! # Examples
//!
//! Rebuild the corpus from `./scopus` and `./ieee`, then flag duplicates:
//! ```bash
//! review --overwrite --duplicates
//! ```
//!
//! Run a keyword query with JSON output:
//! ```bash
//! review -k "(blockchain OR data_recovery) AND (forensics)" --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! review --db-path review.db --interactive
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use literature_review::{
    config::{OutputFormat, ReviewConfig},
    dedup::{mark_duplicates, DedupOutcome},
    filter::{self, FilterOutcome},
    ingestion::IngestionPipeline,
    models::{ColumnInfo, Record},
    provider::{ris::RisDirectoryProvider, RecordProvider},
    query::compile,
    storage::{
        sqlite::{RawRows, SqliteStore},
        CorpusStore, ARTICLE_ID_SEQUENCE,
    },
    summary::{generate_summary, Summary},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TITLE_WIDTH: usize = 70;

/// Review CLI for screening a bibliographic corpus
#[derive(Parser, Debug)]
#[command(
    name = "review",
    version,
    about = "Build, deduplicate and keyword-filter a literature review corpus",
    long_about = "Load RIS exports from several sources into one SQLite corpus, flag \
                  duplicate titles and select relevant records with boolean keyword queries.

EXAMPLES:
  Rebuild the corpus and flag duplicates:
    review --overwrite --duplicates

  Keyword query:
    review -k \"(blockchain OR data_recovery) AND (forensics)\"

  Custom sources:
    review -o --base-dir exports --source acm --source wos

  Interactive mode:
    review --interactive"
)]
struct Args {
    /// Reset all stored state (records and id sequence)
    #[arg(short = 'c', long)]
    clear: bool,

    /// Drop the corpus, rebuild the schema and re-ingest all sources
    #[arg(short = 'o', long)]
    overwrite: bool,

    /// Display the corpus table structure
    #[arg(short = 't', long)]
    table_structure: bool,

    /// Flag duplicate titles and print the duplicates
    #[arg(short = 'd', long)]
    duplicates: bool,

    /// Keyword query, e.g. "(a OR b) AND (c)"
    #[arg(short = 'k', long, value_name = "QUERY")]
    keywords: Option<String>,

    /// Raw SQL statement for diagnostics
    #[arg(short = 'q', long, value_name = "SQL")]
    query: Option<String>,

    /// Enable interactive REPL mode
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Database file path [env: SLR_DB_PATH]
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Directory holding one sub-directory of RIS files per source [env: SLR_BASE_DIR]
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Source name; repeat for several sources [env: SLR_SOURCES]
    #[arg(long = "source", value_name = "NAME")]
    sources: Vec<String>,

    /// Output format [env: SLR_OUTPUT_FORMAT]
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Logging verbosity level
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

impl Args {
    fn has_step(&self) -> bool {
        self.clear
            || self.overwrite
            || self.table_structure
            || self.duplicates
            || self.keywords.is_some()
            || self.query.is_some()
            || self.interactive
    }

    /// Apply command-line overrides on top of the environment configuration.
    fn resolve_config(&self) -> ReviewConfig {
        let mut config = ReviewConfig::from_env();
        if let Some(path) = &self.db_path {
            config = config.with_db_path(path.clone());
        }
        if let Some(dir) = &self.base_dir {
            config = config.with_base_dir(dir.clone());
        }
        if !self.sources.is_empty() {
            config = config.with_sources(self.sources.clone());
        }
        if let Some(format) = self.format {
            config = config.with_output_format(format);
        }
        config
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Open the store, creating the parent directory if needed
fn open_store(config: &ReviewConfig) -> Result<SqliteStore> {
    debug!("Opening SQLite store at: {}", config.db_path.display());

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }

    SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} records | Inserted: {msg}")
        .context("Invalid progress bar template")?
        .progress_chars("##-");
    pb.set_style(style);
    Ok(pb)
}

/// Truncate on a character boundary
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")
}

/// Drop and rebuild the corpus from the configured RIS directories
fn rebuild_corpus(mut store: SqliteStore, config: &ReviewConfig) -> Result<SqliteStore> {
    let start = Instant::now();
    store.reset().context("Failed to reset the corpus")?;
    let sequence = store
        .sequence(ARTICLE_ID_SEQUENCE)
        .context("Failed to create the identifier sequence")?;
    debug!("Drawing identifiers from sequence '{}'", sequence.name());

    let provider = RisDirectoryProvider::new(config.base_dir.clone(), config.sources.clone());
    info!(
        "Loading records from {} ({})...",
        provider.name(),
        provider.sources().join(", ")
    );
    let entries = provider
        .fetch_entries()
        .with_context(|| format!("Failed to load records from {:?}", config.base_dir))?;

    if entries.is_empty() {
        warn!("No records found under {:?}", config.base_dir);
    }

    let progress = create_progress_bar(entries.len())?;
    progress.set_message("0");

    let mut pipeline = IngestionPipeline::new(store, sequence);
    let stats = pipeline
        .ingest_entries(entries, |stats| {
            progress.set_position(stats.total_processed as u64);
            progress.set_message(stats.inserted.to_string());
        })
        .context("Failed to ingest records")?;
    progress.finish_with_message(stats.inserted.to_string());

    let elapsed = start.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Failed:               {:>16} ║", stats.failed);
    for (source, count) in &stats.per_source {
        println!("║ {:<21} {:>16} ║", truncate(source, 21), count);
    }
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!("{} records failed to insert - check logs for details", stats.failed);
    }

    Ok(pipeline.into_store())
}

fn format_schema_table(columns: &[ColumnInfo]) -> String {
    let mut table = new_table();
    table.set_header(header(&["cid", "name", "type", "not null", "default", "pk"]));
    for column in columns {
        table.add_row(vec![
            Cell::new(column.cid),
            Cell::new(&column.name),
            Cell::new(&column.decl_type),
            Cell::new(column.not_null),
            Cell::new(column.default_value.as_deref().unwrap_or("")),
            Cell::new(column.primary_key),
        ]);
    }
    table.to_string()
}

fn format_records_table(records: &[&Record]) -> String {
    if records.is_empty() {
        return "No records found.".to_string();
    }

    let mut table = new_table();
    table.set_header(header(&["ID", "Source", "Title", "Year", "Duplicate"]));
    for record in records {
        let duplicate = if record.is_duplicate {
            Cell::new("yes").fg(Color::Yellow)
        } else {
            Cell::new("no")
        };
        table.add_row(vec![
            Cell::new(record.unique_id),
            Cell::new(&record.source),
            Cell::new(truncate(record.title().unwrap_or("<untitled>"), TITLE_WIDTH)),
            Cell::new(record.year().unwrap_or("")),
            duplicate,
        ]);
    }
    table.to_string()
}

fn format_summary_table(summary: &Summary) -> String {
    let mut table = new_table();
    table.set_header(header(&["Summary", "Count"]));
    table.add_row(vec![Cell::new("Total Articles"), Cell::new(summary.total)]);
    for entry in &summary.per_source {
        table.add_row(vec![
            Cell::new(format!("  Source: {}", entry.source)),
            Cell::new(entry.count),
        ]);
    }
    table.add_row(vec![Cell::new("Total Duplicates"), Cell::new(summary.duplicates)]);
    table.add_row(vec![Cell::new("Total Unique Articles"), Cell::new(summary.unique)]);
    table.add_row(vec![
        Cell::new("Total Keyword Matches"),
        Cell::new(summary.keyword_matches),
    ]);
    table.add_row(vec![
        Cell::new("Relevant Articles").add_attribute(Attribute::Bold),
        Cell::new(summary.relevant).fg(Color::Green),
    ]);
    table.to_string()
}

fn format_raw_rows(rows: &RawRows) -> String {
    if rows.columns.is_empty() {
        return format!("{} rows affected", rows.affected);
    }
    let mut table = new_table();
    let names: Vec<&str> = rows.columns.iter().map(String::as_str).collect();
    table.set_header(header(&names));
    for row in &rows.rows {
        table.add_row(row.iter().map(|value| Cell::new(truncate(value, TITLE_WIDTH))));
    }
    table.to_string()
}

fn selected<'a>(records: &'a [Record], ids: &BTreeSet<i64>) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| ids.contains(&record.unique_id))
        .collect()
}

fn show_table_structure(store: &SqliteStore, format: OutputFormat) -> Result<()> {
    let columns = store
        .table_structure()
        .context("Failed to read the table structure")?;
    match format {
        OutputFormat::Table => println!("{}", format_schema_table(&columns)),
        OutputFormat::Json => println!("{}", to_json(&columns)?),
    }
    Ok(())
}

fn show_summary(store: &SqliteStore, config: &ReviewConfig, format: OutputFormat) -> Result<()> {
    let summary =
        generate_summary(store, &config.sources).context("Failed to generate the summary")?;
    match format {
        OutputFormat::Table => println!("{}", format_summary_table(&summary)),
        OutputFormat::Json => println!("{}", to_json(&summary)?),
    }
    Ok(())
}

fn run_duplicates(store: &mut SqliteStore, config: &ReviewConfig, format: OutputFormat) -> Result<()> {
    let outcome: DedupOutcome = mark_duplicates(store).context("Failed to flag duplicates")?;
    let records = store.load_records().context("Failed to load records")?;
    let duplicates = selected(&records, &outcome.duplicates);
    let summary =
        generate_summary(&*store, &config.sources).context("Failed to generate the summary")?;

    match format {
        OutputFormat::Table => {
            println!("Duplicates:");
            println!("{}", format_records_table(&duplicates));
            if outcome.untitled > 0 {
                println!("{} untitled records were not compared", outcome.untitled);
            }
            println!("{}", format_summary_table(&summary));
        }
        OutputFormat::Json => {
            let doc = json!({
                "duplicates": duplicates,
                "untitled": outcome.untitled,
                "summary": summary,
            });
            println!("{}", to_json(&doc)?);
        }
    }
    Ok(())
}

fn run_keywords(
    store: &mut SqliteStore,
    config: &ReviewConfig,
    raw_query: &str,
    format: OutputFormat,
) -> Result<()> {
    let query = compile(raw_query)?;
    debug!("Compiled keyword query: {}", query);

    let start = Instant::now();
    let outcome: FilterOutcome = filter::apply(&query, store)
        .with_context(|| format!("Failed to execute keyword query: '{}'", raw_query))?;
    let elapsed = start.elapsed();

    let records = store.load_records().context("Failed to load records")?;
    let matches = selected(&records, &outcome.matched);
    let summary =
        generate_summary(&*store, &config.sources).context("Failed to generate the summary")?;

    match format {
        OutputFormat::Table => {
            println!("Keyword matches for {}:", query);
            println!("{}", format_records_table(&matches));
            println!(
                "\nMatched {} of {} records in {:.2}s",
                outcome.matched.len(),
                outcome.evaluated,
                elapsed.as_secs_f64()
            );
            println!("{}", format_summary_table(&summary));
        }
        OutputFormat::Json => {
            let doc = json!({
                "query": query.to_string(),
                "evaluated": outcome.evaluated,
                "matches": matches,
                "summary": summary,
            });
            println!("{}", to_json(&doc)?);
        }
    }
    Ok(())
}

fn run_raw_query(store: &SqliteStore, sql: &str, format: OutputFormat) -> Result<()> {
    let rows = store
        .execute_raw(sql)
        .with_context(|| format!("Failed to execute query: '{}'", sql))?;
    match format {
        OutputFormat::Table => println!("{}", format_raw_rows(&rows)),
        OutputFormat::Json => println!("{}", to_json(&rows)?),
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  <query>          - Run a keyword query, e.g. (a OR b) AND (c)");
    println!("  /summary         - Show the corpus summary");
    println!("  /duplicates      - Flag duplicate titles");
    println!("  /schema          - Show the table structure");
    println!("  /format table    - Use table output format");
    println!("  /format json     - Use JSON output format");
    println!("  /help            - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive REPL mode
fn run_interactive(
    store: &mut SqliteStore,
    config: &ReviewConfig,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Literature Review");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        match rl.readline("Review> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    let outcome = match parts[0] {
                        "/help" => {
                            print_help();
                            Ok(())
                        }
                        "/summary" => show_summary(store, config, format),
                        "/duplicates" => run_duplicates(store, config, format),
                        "/schema" => show_table_structure(store, format),
                        "/format" => {
                            match parts.get(1).and_then(|name| OutputFormat::from_name(name)) {
                                Some(chosen) if parts.len() == 2 => {
                                    format = chosen;
                                    println!("Set output format to {:?}", format);
                                }
                                _ => eprintln!("Usage: /format [table|json]"),
                            }
                            Ok(())
                        }
                        other => {
                            eprintln!("Unknown command: {}. Type /help for available commands.", other);
                            Ok(())
                        }
                    };
                    if let Err(e) = outcome {
                        eprintln!("Command failed: {:#}", e);
                    }
                } else if let Err(e) = run_keywords(store, config, line, format) {
                    eprintln!("Query failed: {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    if !args.has_step() {
        anyhow::bail!(
            "No step selected. Use one or more of --clear, --overwrite, --table-structure, \
             --duplicates, --keywords, --query or --interactive.\n\
             Use --help for usage information."
        );
    }

    let config = args.resolve_config();
    config.validate().context("Invalid configuration")?;
    let format = config.output_format;
    info!(
        "Using database {} with sources {:?}",
        config.db_path.display(),
        config.sources
    );

    let mut store = open_store(&config)?;

    if args.clear {
        store.reset().context("Failed to clear stored state")?;
        println!("Cleared all stored state in {}", config.db_path.display());
    }

    if args.overwrite {
        store = rebuild_corpus(store, &config)?;
    }

    if args.table_structure {
        show_table_structure(&store, format)?;
    }

    if args.duplicates {
        run_duplicates(&mut store, &config, format)?;
    }

    if let Some(raw_query) = &args.keywords {
        run_keywords(&mut store, &config, raw_query, format)?;
    }

    if let Some(sql) = &args.query {
        run_raw_query(&store, sql, format)?;
    }

    if args.interactive {
        run_interactive(&mut store, &config, format)?;
    }

    Ok(())
}
