//! Bulk loading of CSV rows into flat TEXT tables
//!
//! All functions run on the caller's connection so the whole import shares
//! one transaction.

use camtrap_common::db::quote_ident;
use camtrap_common::{Error, Result};
use csv::StringRecord;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

use super::schema::{infer_columns, CsvSource};
use super::{ImportOptions, ImportSummary, TableSummary, STUDY_INFO_TABLE};

/// Upper bound on bound parameters per INSERT statement
const MAX_BIND_PARAMS: usize = 32_000;

/// Lookup indexes created when an imported table has the column
const KNOWN_INDEXES: &[(&str, &str)] = &[
    ("observations", "deploymentID"),
    ("observations", "mediaID"),
    ("observations", "scientificName"),
    ("observations", "eventStart"),
    ("media", "deploymentID"),
    ("media", "timestamp"),
];

/// Rows per INSERT, capped by the bind parameter limit
pub fn effective_batch_rows(batch_rows: usize, column_count: usize) -> usize {
    let cap = MAX_BIND_PARAMS / column_count.max(1);
    batch_rows.min(cap).max(1)
}

/// Replace `source.table_name` with the rows of the CSV file
pub async fn load_csv(
    conn: &mut SqliteConnection,
    source: &CsvSource,
    options: &ImportOptions,
) -> Result<TableSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(&source.path)?;

    let header = reader.headers()?.clone();
    let columns = infer_columns(&header);
    if columns.is_empty() {
        return Err(Error::InvalidInput(format!(
            "CSV file has no header: {}",
            source.path.display()
        )));
    }

    let table = quote_ident(&source.table_name);
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let column_defs = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!("CREATE TABLE {} ({})", table, column_defs))
        .execute(&mut *conn)
        .await?;

    let insert_prefix = format!("INSERT INTO {} ({}) ", table, column_list);
    let batch_rows = effective_batch_rows(options.batch_rows, columns.len());
    let width = columns.len();

    let mut summary = TableSummary {
        table_name: source.table_name.clone(),
        source_file: source
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        columns,
        row_count: 0,
        padded_rows: 0,
        truncated_rows: 0,
    };

    let mut batch: Vec<Vec<Option<String>>> = Vec::with_capacity(batch_rows);
    let mut record = StringRecord::new();

    while reader.read_record(&mut record)? {
        if record.len() > width {
            summary.truncated_rows += 1;
        } else if record.len() < width {
            summary.padded_rows += 1;
        }

        // Empty fields become NULL; short rows are padded with NULL
        let row = (0..width)
            .map(|i| record.get(i).filter(|v| !v.is_empty()).map(str::to_string))
            .collect();
        batch.push(row);

        if batch.len() >= batch_rows {
            summary.row_count += insert_batch(conn, &insert_prefix, &mut batch).await?;
            debug!("{}: {} rows loaded", summary.table_name, summary.row_count);
        }
    }
    summary.row_count += insert_batch(conn, &insert_prefix, &mut batch).await?;

    if summary.truncated_rows > 0 {
        warn!(
            "{}: {} rows had more fields than the header; extra fields dropped",
            summary.source_file, summary.truncated_rows
        );
    }
    if summary.padded_rows > 0 {
        warn!(
            "{}: {} rows had fewer fields than the header; padded with NULL",
            summary.source_file, summary.padded_rows
        );
    }
    info!(
        "Loaded {} rows into '{}' ({} columns)",
        summary.row_count,
        summary.table_name,
        summary.columns.len()
    );

    Ok(summary)
}

/// Insert and drain the batch as one multi-row INSERT
async fn insert_batch(
    conn: &mut SqliteConnection,
    insert_prefix: &str,
    batch: &mut Vec<Vec<Option<String>>>,
) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(insert_prefix);
    builder.push_values(batch.drain(..), |mut values, row| {
        for value in row {
            values.push_bind(value);
        }
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Create lookup indexes for the Camtrap DP columns present
pub async fn create_indexes(
    conn: &mut SqliteConnection,
    tables: &[TableSummary],
) -> Result<Vec<String>> {
    let mut created = Vec::new();

    for (table_name, column) in KNOWN_INDEXES {
        let Some(table) = tables.iter().find(|t| t.table_name == *table_name) else {
            continue;
        };
        if !table.columns.iter().any(|c| c == column) {
            continue;
        }

        let index_name = format!("idx_{}_{}", table_name, column);
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&index_name),
            quote_ident(table_name),
            quote_ident(column)
        ))
        .execute(&mut *conn)
        .await?;
        created.push(index_name);
    }

    Ok(created)
}

/// (Re)create the single-row `study_info` table
pub async fn write_study_info(conn: &mut SqliteConnection, summary: &ImportSummary) -> Result<()> {
    let table = quote_ident(STUDY_INFO_TABLE);

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!(
        r#"
        CREATE TABLE {} (
            study_id TEXT PRIMARY KEY,
            name TEXT,
            title TEXT NOT NULL,
            description TEXT,
            temporal_start TEXT,
            temporal_end TEXT,
            source_path TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            manifest TEXT NOT NULL
        )
        "#,
        table
    ))
    .execute(&mut *conn)
    .await?;

    let manifest = &summary.manifest;
    let temporal = manifest.temporal.clone().unwrap_or_default();

    sqlx::query(&format!(
        "INSERT INTO {} (study_id, name, title, description, temporal_start, temporal_end, \
         source_path, imported_at, manifest) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        table
    ))
    .bind(&summary.study_id)
    .bind(&manifest.name)
    .bind(&summary.title)
    .bind(&manifest.description)
    .bind(&temporal.start)
    .bind(&temporal.end)
    .bind(&summary.source_path)
    .bind(&summary.imported_at)
    .bind(serde_json::to_string(&manifest.raw)?)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
