//! Read-only aggregation queries over an imported study
//!
//! Imported columns are TEXT. Camtrap DP timestamps look like
//! `2023-01-02T06:15:00+01:00`; the calendar date and hour of day are taken
//! from the string itself (camera local time), interval arithmetic uses
//! SQLite `julianday()`.

pub mod activity;
pub mod heatmap;
pub mod media;
pub mod overview;
pub mod species;
pub mod stats;
pub mod timeseries;

use camtrap_common::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

pub use activity::{deployments_activity, locations_activity, ActivityReport};
pub use heatmap::{species_daily_activity, species_heatmap, HeatmapPoint, HourBucket};
pub use media::{latest_media, MediaFilter, MediaItem, MediaPage};
pub use overview::{study_overview, StudyOverview};
pub use species::{deployments, species_distribution, Deployment, SpeciesCount};
pub use timeseries::{species_timeseries, top_species_timeseries, Timeseries, WeeklyCounts};

pub const OBSERVATIONS: &str = "observations";
pub const DEPLOYMENTS: &str = "deployments";
pub const MEDIA: &str = "media";

/// Local calendar date (`YYYY-MM-DD`) of a timestamp column
pub(crate) fn date_expr(column: &str) -> String {
    format!("substr({}, 1, 10)", column)
}

/// Local hour of day (0-23) of a timestamp column
pub(crate) fn hour_expr(column: &str) -> String {
    format!("CAST(substr({}, 12, 2) AS INTEGER)", column)
}

/// Inclusive calendar date range; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Half-open hour-of-day range `[start, end)`
///
/// `start > end` wraps midnight (22 → 6 covers the night). `start == end`
/// covers the whole day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(start) = self.start {
            if start > 23 {
                return Err(Error::InvalidInput(format!("start_hour must be 0-23, got {}", start)));
            }
        }
        if let Some(end) = self.end {
            if end > 24 {
                return Err(Error::InvalidInput(format!("end_hour must be 0-24, got {}", end)));
            }
        }
        Ok(())
    }

    /// Whether an hour of day falls in the range
    pub fn contains(&self, hour: u32) -> bool {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s == e => true,
            (Some(s), Some(e)) if s < e => hour >= s && hour < e,
            (Some(s), Some(e)) => hour >= s || hour < e,
            (Some(s), None) => hour >= s,
            (None, Some(e)) => hour < e,
            (None, None) => true,
        }
    }

    fn push_condition(&self, builder: &mut QueryBuilder<'_, Sqlite>, timestamp_column: &str) {
        let hour = hour_expr(timestamp_column);
        let condition = match (self.start, self.end) {
            (Some(s), Some(e)) if s == e => return,
            (Some(s), Some(e)) if s < e => format!("{hour} >= {s} AND {hour} < {e}"),
            (Some(s), Some(e)) => format!("({hour} >= {s} OR {hour} < {e})"),
            (Some(s), None) => format!("{hour} >= {s}"),
            (None, Some(e)) => format!("{hour} < {e}"),
            (None, None) => return,
        };
        builder.push(format!(
            " AND length({}) >= 13 AND {}",
            timestamp_column, condition
        ));
    }
}

/// Species / date / hour restriction shared by the filtered queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationFilter {
    /// Empty means every species
    pub species: Vec<String>,
    pub dates: DateRange,
    pub hours: HourRange,
}

impl ObservationFilter {
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.dates.start, self.dates.end) {
            if start > end {
                return Err(Error::InvalidInput(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        self.hours.validate()
    }

    /// Append ` AND ...` conditions. Hour values are validated integers and
    /// are inlined; user strings are always bound.
    pub(crate) fn push_conditions(
        &self,
        builder: &mut QueryBuilder<'_, Sqlite>,
        timestamp_column: &str,
        species_column: &str,
    ) {
        if !self.species.is_empty() {
            builder.push(format!(" AND {} IN (", species_column));
            let mut list = builder.separated(", ");
            for name in &self.species {
                list.push_bind(name.clone());
            }
            list.push_unseparated(")");
        }

        if let Some(start) = self.dates.start {
            builder.push(format!(" AND {} >= ", date_expr(timestamp_column)));
            builder.push_bind(start.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = self.dates.end {
            builder.push(format!(" AND {} <= ", date_expr(timestamp_column)));
            builder.push_bind(end.format("%Y-%m-%d").to_string());
        }

        self.hours.push_condition(builder, timestamp_column);
    }
}

/// Parse a comma-separated species list, dropping blanks and repeats
pub fn parse_species_list(input: &str) -> Vec<String> {
    let mut species: Vec<String> = Vec::new();
    for name in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !species.iter().any(|s| s == name) {
            species.push(name.to_string());
        }
    }
    species
}

/// Parse `YYYY-MM-DD`
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!("{} must be YYYY-MM-DD, got '{}'", field, value))
    })
}

/// Coordinate stored as text; `None` when missing or not a finite number
pub(crate) fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::importer::{import_dataset, ImportOptions};
    use camtrap_common::db::open_in_memory;
    use sqlx::SqlitePool;
    use std::path::PathBuf;

    pub fn fixture_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/camtrap-dp")
    }

    /// In-memory database holding the fixture study
    pub async fn fixture_pool() -> SqlitePool {
        let pool = open_in_memory().await.unwrap();
        import_dataset(&pool, &fixture_dir(), "fixture", &ImportOptions::default())
            .await
            .unwrap();
        pool
    }
}
