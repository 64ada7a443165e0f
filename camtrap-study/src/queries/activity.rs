//! Deployment and location activity histograms
//!
//! The survey interval `[MIN(deploymentStart), MAX(deploymentEnd)]` is split
//! into equal periods and species observations are counted per subject and
//! period. The 90th percentile of the non-zero counts is reported so a
//! consumer can scale colors without outliers dominating.

use camtrap_common::db::require_tables;
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use super::species::deployments;
use super::stats::{bucket_index, julian_day_to_rfc3339, percentile, split_interval};
use super::{parse_coordinate, DEPLOYMENTS, OBSERVATIONS};

pub const DEFAULT_PERIODS: usize = 20;
pub const MAX_PERIODS: usize = 1000;

/// Percentile reported as `percentile_90_count`
const SCALE_PERCENTILE: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityGrouping {
    Deployment,
    Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityPeriod {
    pub start: String,
    pub end: String,
    pub count: i64,
}

/// One deployment or location and its per-period counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    pub id: String,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub total: i64,
    pub periods: Vec<ActivityPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub period_count: usize,
    pub percentile_90_count: i64,
    pub rows: Vec<ActivityRow>,
}

/// Activity histogram per deployment
pub async fn deployments_activity(pool: &SqlitePool, periods: usize) -> Result<ActivityReport> {
    activity_report(pool, ActivityGrouping::Deployment, periods).await
}

/// Activity histogram per location (deployments sharing a `locationID`)
pub async fn locations_activity(pool: &SqlitePool, periods: usize) -> Result<ActivityReport> {
    activity_report(pool, ActivityGrouping::Location, periods).await
}

pub async fn activity_report(
    pool: &SqlitePool,
    grouping: ActivityGrouping,
    periods: usize,
) -> Result<ActivityReport> {
    if periods == 0 || periods > MAX_PERIODS {
        return Err(Error::InvalidInput(format!(
            "periods must be between 1 and {}, got {}",
            MAX_PERIODS, periods
        )));
    }
    require_tables(pool, &[DEPLOYMENTS, OBSERVATIONS]).await?;

    let mut rows = load_subjects(pool, grouping).await?;

    let (range_start, range_end): (Option<f64>, Option<f64>) = sqlx::query_as(
        "SELECT MIN(julianday(deploymentStart)), MAX(julianday(deploymentEnd)) FROM deployments",
    )
    .fetch_one(pool)
    .await?;

    let (Some(start), Some(mut end)) = (range_start, range_end) else {
        debug!("No parsable deployment dates; activity report is empty");
        return Ok(ActivityReport {
            start_date: None,
            end_date: None,
            period_count: 0,
            percentile_90_count: 0,
            rows,
        });
    };
    if end <= start {
        // Degenerate survey interval: widen to one day
        end = start + 1.0;
    }

    let buckets = split_interval(start, end, periods);
    let width = (end - start) / periods as f64;

    let subject_expr = match grouping {
        ActivityGrouping::Deployment => "o.deploymentID",
        ActivityGrouping::Location => "COALESCE(d.locationID, d.locationName)",
    };
    let counts: Vec<(Option<String>, f64, i64)> = sqlx::query_as(&format!(
        r#"
        SELECT {subject} AS subject, julianday(o.eventStart) AS jd, COUNT(*) AS n
        FROM observations o
        JOIN deployments d ON d.deploymentID = o.deploymentID
        WHERE o.scientificName IS NOT NULL
          AND julianday(o.eventStart) IS NOT NULL
          AND julianday(o.eventStart) >= ?
          AND julianday(o.eventStart) <= ?
        GROUP BY subject, jd
        "#,
        subject = subject_expr
    ))
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let mut histogram: HashMap<String, Vec<i64>> = rows
        .iter()
        .map(|row| (row.id.clone(), vec![0; periods]))
        .collect();
    for (subject, julian_day, n) in counts {
        let Some(subject) = subject else { continue };
        let bucket = bucket_index(julian_day, start, width, periods);
        if let Some(slots) = histogram.get_mut(&subject) {
            slots[bucket] += n;
        }
    }

    let non_zero: Vec<i64> = histogram
        .values()
        .flat_map(|slots| slots.iter().copied())
        .filter(|&c| c > 0)
        .collect();

    for row in &mut rows {
        let slots = histogram.remove(&row.id).unwrap_or_else(|| vec![0; periods]);
        row.total = slots.iter().sum();
        row.periods = buckets
            .iter()
            .zip(slots)
            .map(|(&(lo, hi), count)| ActivityPeriod {
                start: julian_day_to_rfc3339(lo).unwrap_or_default(),
                end: julian_day_to_rfc3339(hi).unwrap_or_default(),
                count,
            })
            .collect();
    }

    Ok(ActivityReport {
        start_date: julian_day_to_rfc3339(start),
        end_date: julian_day_to_rfc3339(end),
        period_count: periods,
        percentile_90_count: percentile(&non_zero, SCALE_PERCENTILE),
        rows,
    })
}

/// Report rows with identity and coordinates, counts still empty
async fn load_subjects(pool: &SqlitePool, grouping: ActivityGrouping) -> Result<Vec<ActivityRow>> {
    match grouping {
        ActivityGrouping::Deployment => Ok(deployments(pool)
            .await?
            .into_iter()
            .map(|d| ActivityRow {
                id: d.deployment_id,
                name: d.location_name,
                latitude: d.latitude,
                longitude: d.longitude,
                total: 0,
                periods: Vec::new(),
            })
            .collect()),
        ActivityGrouping::Location => {
            let locations: Vec<(String, Option<String>, Option<String>, Option<String>)> =
                sqlx::query_as(
                    r#"
                    SELECT COALESCE(locationID, locationName) AS location_key,
                           MIN(locationName),
                           MIN(latitude),
                           MIN(longitude)
                    FROM deployments
                    WHERE COALESCE(locationID, locationName) IS NOT NULL
                    GROUP BY location_key
                    ORDER BY location_key ASC
                    "#,
                )
                .fetch_all(pool)
                .await?;

            Ok(locations
                .into_iter()
                .map(|(id, name, lat, lon)| ActivityRow {
                    id,
                    name,
                    latitude: parse_coordinate(lat.as_deref()),
                    longitude: parse_coordinate(lon.as_deref()),
                    total: 0,
                    periods: Vec::new(),
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::fixture_pool;

    fn counts(row: &ActivityRow) -> Vec<i64> {
        row.periods.iter().map(|p| p.count).collect()
    }

    #[tokio::test]
    async fn test_deployments_activity_buckets() {
        let pool = fixture_pool().await;
        let report = deployments_activity(&pool, 5).await.unwrap();

        assert_eq!(report.start_date.as_deref(), Some("2023-01-02T00:00:00Z"));
        assert_eq!(report.end_date.as_deref(), Some("2023-01-12T00:00:00Z"));
        assert_eq!(report.period_count, 5);
        assert_eq!(report.percentile_90_count, 2);

        let ids: Vec<&str> = report.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dep1", "dep2", "dep4", "dep3"]);

        assert_eq!(counts(&report.rows[0]), vec![2, 0, 0, 1, 0]);
        assert_eq!(counts(&report.rows[1]), vec![0, 1, 0, 0, 2]);
        assert_eq!(counts(&report.rows[2]), vec![0, 0, 1, 0, 0]);
        // The observation exactly at the survey end lands in the last period
        assert_eq!(counts(&report.rows[3]), vec![0, 0, 0, 0, 2]);

        let second = &report.rows[0].periods[1];
        assert_eq!(second.start, "2023-01-04T00:00:00Z");
        assert_eq!(second.end, "2023-01-06T00:00:00Z");
    }

    #[tokio::test]
    async fn test_locations_activity_merges_deployments() {
        let pool = fixture_pool().await;
        let report = locations_activity(&pool, 5).await.unwrap();

        let ids: Vec<&str> = report.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["loc1", "loc2", "loc3"]);
        assert_eq!(report.rows[0].name.as_deref(), Some("North Ridge"));
        assert_eq!(counts(&report.rows[0]), vec![2, 0, 0, 1, 2]);
        assert_eq!(report.rows[0].total, 5);
        assert_eq!(report.rows[2].latitude, None);
    }

    #[tokio::test]
    async fn test_default_periods_cover_all_in_range_observations() {
        let pool = fixture_pool().await;
        let report = deployments_activity(&pool, DEFAULT_PERIODS).await.unwrap();

        assert!(report.rows.iter().all(|r| r.periods.len() == DEFAULT_PERIODS));
        // Ten species observations, one recorded after the last deployment ended
        let total: i64 = report.rows.iter().map(|r| r.total).sum();
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn test_invalid_period_count() {
        let pool = fixture_pool().await;
        assert!(matches!(
            deployments_activity(&pool, 0).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            locations_activity(&pool, MAX_PERIODS + 1).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_no_parsable_dates_yields_empty_periods() {
        let pool = camtrap_common::db::open_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TABLE deployments (deploymentID TEXT, locationID TEXT, locationName TEXT, \
             latitude TEXT, longitude TEXT, deploymentStart TEXT, deploymentEnd TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO deployments VALUES ('d1', 'l1', 'L', NULL, NULL, 'unknown', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE observations (deploymentID TEXT, eventStart TEXT, scientificName TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let report = deployments_activity(&pool, 10).await.unwrap();
        assert_eq!(report.period_count, 0);
        assert_eq!(report.rows.len(), 1);
        assert!(report.rows[0].periods.is_empty());
    }
}
