//! CSV discovery and flat schema inference
//!
//! One table per CSV file, every column TEXT. Names come from user files and
//! are normalized here; SQL always sees them through `quote_ident`.

use camtrap_common::{Error, Result};
use csv::StringRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A CSV file to import and the table it becomes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSource {
    pub path: PathBuf,
    pub table_name: String,
}

/// List `*.csv` files directly inside `dir`, sorted by file name
pub fn discover_tables(dir: &Path) -> Result<Vec<CsvSource>> {
    if !dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        sources.push(CsvSource {
            path: path.to_path_buf(),
            table_name: sanitize_table_name(&stem),
        });
    }

    let mut seen = HashSet::new();
    for source in &sources {
        if !seen.insert(source.table_name.as_str()) {
            return Err(Error::InvalidInput(format!(
                "Two CSV files map to the same table name '{}'",
                source.table_name
            )));
        }
    }

    Ok(sources)
}

/// File stem to table name: `[A-Za-z0-9_]`, never starting with a digit
pub fn sanitize_table_name(stem: &str) -> String {
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        name.push_str("table");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "t_");
    }
    name
}

/// Column names from a CSV header
///
/// Blank names become `column_<n>` (1-based position); repeated names get
/// `_2`, `_3`, ... so every column stays addressable.
pub fn infer_columns(header: &StringRecord) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(header.len());

    for (i, field) in header.iter().enumerate() {
        let base = match field.trim() {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        };

        let mut candidate = base.clone();
        let mut suffix = 2;
        while !seen.insert(candidate.to_lowercase()) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        columns.push(candidate);
    }

    columns
}
