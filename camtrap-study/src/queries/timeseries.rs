//! Weekly species timeseries
//!
//! Weeks start on Monday. The week list comes from a recursive CTE over the
//! whole observation range so weeks without observations are present with
//! zero counts.

use camtrap_common::db::require_tables;
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use tracing::warn;

use super::species::{species_distribution, SpeciesCount};
use super::{date_expr, OBSERVATIONS};

pub const DEFAULT_TOP_SPECIES: usize = 5;

/// Guard against runaway ranges from mistyped years
const MAX_WEEKS: i64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyCounts {
    /// Monday of the week, `YYYY-MM-DD`
    pub week_start: String,
    /// Count per requested species; every species is present
    pub counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeseries {
    pub species: Vec<SpeciesCount>,
    pub weeks: Vec<WeeklyCounts>,
}

/// Monday on or before the date of `column`
fn week_start_expr(column: &str) -> String {
    format!("date({}, '-6 days', 'weekday 1')", date_expr(column))
}

/// Weekly counts for the `limit` most observed species
pub async fn top_species_timeseries(pool: &SqlitePool, limit: usize) -> Result<Timeseries> {
    if limit == 0 {
        return Err(Error::InvalidInput("limit must be at least 1".to_string()));
    }
    let top: Vec<SpeciesCount> = species_distribution(pool)
        .await?
        .into_iter()
        .take(limit)
        .collect();

    weekly_timeseries(pool, top).await
}

/// Weekly counts for the given species, in the order given
pub async fn species_timeseries(pool: &SqlitePool, species: &[String]) -> Result<Timeseries> {
    if species.is_empty() {
        return Err(Error::InvalidInput("at least one species is required".to_string()));
    }
    require_tables(pool, &[OBSERVATIONS]).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT scientificName, COUNT(*) FROM observations WHERE scientificName IN (",
    );
    let mut list = builder.separated(", ");
    for name in species {
        list.push_bind(name.clone());
    }
    list.push_unseparated(") GROUP BY scientificName");

    let totals: BTreeMap<String, i64> = builder
        .build_query_as::<(String, i64)>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let requested = species
        .iter()
        .map(|name| SpeciesCount {
            scientific_name: name.clone(),
            count: totals.get(name).copied().unwrap_or(0),
        })
        .collect();

    weekly_timeseries(pool, requested).await
}

async fn weekly_timeseries(pool: &SqlitePool, species: Vec<SpeciesCount>) -> Result<Timeseries> {
    if species.is_empty() {
        return Ok(Timeseries {
            species,
            weeks: Vec::new(),
        });
    }

    let week_start = week_start_expr("eventStart");
    let (first_week, last_week): (Option<String>, Option<String>) = sqlx::query_as(&format!(
        "SELECT MIN({week}), MAX({week}) FROM observations WHERE scientificName IS NOT NULL",
        week = week_start
    ))
    .fetch_one(pool)
    .await?;
    let week_starts = match (first_week, last_week) {
        (Some(first), Some(last)) => week_range(pool, &first, &last, MAX_WEEKS).await?,
        _ => Vec::new(),
    };

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {week} AS week_start, scientificName, COUNT(*) FROM observations \
         WHERE {week} IS NOT NULL AND scientificName IN (",
        week = week_start
    ));
    let mut list = builder.separated(", ");
    for entry in &species {
        list.push_bind(entry.scientific_name.clone());
    }
    list.push_unseparated(") GROUP BY week_start, scientificName");

    let mut counts: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for (week, name, n) in builder
        .build_query_as::<(String, String, i64)>()
        .fetch_all(pool)
        .await?
    {
        counts.entry(week).or_default().insert(name, n);
    }

    let weeks = week_starts
        .into_iter()
        .map(|week_start| {
            let observed = counts.remove(&week_start).unwrap_or_default();
            let counts = species
                .iter()
                .map(|s| {
                    let n = observed.get(&s.scientific_name).copied().unwrap_or(0);
                    (s.scientific_name.clone(), n)
                })
                .collect();
            WeeklyCounts { week_start, counts }
        })
        .collect();

    Ok(Timeseries { species, weeks })
}

/// Mondays from `first` to `last`, at most `max_weeks` of them
async fn week_range(
    pool: &SqlitePool,
    first: &str,
    last: &str,
    max_weeks: i64,
) -> Result<Vec<String>> {
    let weeks: Vec<String> = sqlx::query_scalar(
        r#"
        WITH RECURSIVE weeks(week_start, n) AS (
            SELECT ?1, 1
            UNION ALL
            SELECT date(week_start, '+7 days'), n + 1
            FROM weeks
            WHERE week_start < ?2 AND n < ?3
        )
        SELECT week_start FROM weeks ORDER BY week_start
        "#,
    )
    .bind(first)
    .bind(last)
    .bind(max_weeks)
    .fetch_all(pool)
    .await?;

    if weeks.last().is_some_and(|w| w.as_str() < last) {
        warn!(
            "Observations span {} to {}; timeseries truncated to {} weeks",
            first, last, max_weeks
        );
    }
    Ok(weeks)
}
