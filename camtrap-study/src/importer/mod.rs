//! Camtrap DP importer
//!
//! Loads a dataset directory (`datapackage.json` + CSV tables) into a study
//! database: one flat TEXT table per CSV file, all inside a single
//! transaction, followed by lookup indexes and the `study_info` row.

pub mod loader;
pub mod manifest;
pub mod schema;

use camtrap_common::config::{ImportConfig, DEFAULT_BATCH_ROWS};
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

pub use manifest::{read_manifest, DataPackage, MANIFEST_FILE};
pub use schema::{discover_tables, CsvSource};

/// Table holding study metadata; reserved, never created from a CSV file
pub const STUDY_INFO_TABLE: &str = "study_info";

/// Importer tuning
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Rows per multi-row INSERT statement
    pub batch_rows: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            batch_rows: config.batch_rows,
        }
    }
}

/// Per-table import result
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_name: String,
    pub source_file: String,
    pub columns: Vec<String>,
    pub row_count: u64,
    /// Rows shorter than the header (padded with NULL)
    pub padded_rows: u64,
    /// Rows longer than the header (extra fields dropped)
    pub truncated_rows: u64,
}

/// Result of importing one dataset
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub study_id: String,
    pub title: String,
    pub source_path: String,
    pub imported_at: String,
    pub tables: Vec<TableSummary>,
    pub indexes: Vec<String>,
    pub manifest: DataPackage,
}

/// Import the dataset in `dir` into `pool`
///
/// Tables with the same names are replaced. On any error the transaction is
/// rolled back and the database is left untouched.
pub async fn import_dataset(
    pool: &SqlitePool,
    dir: &Path,
    study_id: &str,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    let started = Instant::now();

    let manifest = match read_manifest(dir)? {
        Some(manifest) => manifest,
        None => {
            warn!("No {} in {}; importing without metadata", MANIFEST_FILE, dir.display());
            DataPackage {
                raw: serde_json::json!({}),
                ..DataPackage::default()
            }
        }
    };

    let sources = discover_tables(dir)?;
    if sources.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No CSV files found in {}",
            dir.display()
        )));
    }
    if let Some(reserved) = sources
        .iter()
        .find(|s| s.table_name.eq_ignore_ascii_case(STUDY_INFO_TABLE))
    {
        return Err(Error::InvalidInput(format!(
            "Table name '{}' is reserved",
            reserved.table_name
        )));
    }

    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled study".to_string());

    info!(
        "Importing {} CSV files from {} into study {}",
        sources.len(),
        dir.display(),
        study_id
    );

    let mut tx = pool.begin().await?;

    let mut tables = Vec::with_capacity(sources.len());
    for source in &sources {
        tables.push(loader::load_csv(&mut *tx, source, options).await?);
    }
    let indexes = loader::create_indexes(&mut *tx, &tables).await?;

    let summary = ImportSummary {
        study_id: study_id.to_string(),
        title: manifest.display_title(&dir_name),
        source_path: dir.display().to_string(),
        imported_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        tables,
        indexes,
        manifest,
    };
    loader::write_study_info(&mut *tx, &summary).await?;

    tx.commit().await?;

    let total_rows: u64 = summary.tables.iter().map(|t| t.row_count).sum();
    info!(
        "✓ Imported '{}': {} tables, {} rows in {:.2}s",
        summary.title,
        summary.tables.len(),
        total_rows,
        started.elapsed().as_secs_f64()
    );

    Ok(summary)
}
