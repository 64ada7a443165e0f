//! Table listing and metadata queries
//!
//! Imported tables take their names and columns from user files, so every
//! identifier goes through [`quote_ident`] before reaching SQL.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Number of rows in table
    pub row_count: i64,
}

/// Quote an SQL identifier (`"name"`, embedded quotes doubled)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether a table exists
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Fail with `NotFound("table <name>")` unless every table exists
pub async fn require_tables(pool: &SqlitePool, table_names: &[&str]) -> Result<()> {
    for name in table_names {
        if !table_exists(pool, name).await? {
            return Err(Error::NotFound(format!("table {}", name)));
        }
    }
    Ok(())
}

/// Column names of a table, in declaration order
pub async fn table_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table_name)))
        .fetch_all(pool)
        .await?;

    // PRAGMA table_info returns: (cid, name, type, notnull, dflt_value, pk)
    Ok(rows.iter().map(|row| row.get::<String, _>(1)).collect())
}

/// List all tables with row counts
///
/// Returns tables in alphabetical order, excluding SQLite internal tables.
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>> {
    let tables = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
          AND name NOT LIKE 'sqlite_%'
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut table_infos = Vec::with_capacity(tables.len());

    for (table_name,) in tables {
        let row_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&table_name)))
                .fetch_one(pool)
                .await?;

        table_infos.push(TableInfo {
            name: table_name,
            row_count,
        });
    }

    Ok(table_infos)
}
