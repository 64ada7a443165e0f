//! Geo heatmap and hour-of-day activity

use camtrap_common::db::require_tables;
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap};

use super::{hour_expr, parse_coordinate, DateRange, ObservationFilter, DEPLOYMENTS, OBSERVATIONS};

/// Observation count of one species at one coordinate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub scientific_name: String,
    pub count: i64,
}

/// Counts per species for one hour of the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourBucket {
    pub hour: u32,
    pub counts: BTreeMap<String, i64>,
}

/// Species observations aggregated per deployment coordinate
///
/// Deployments without usable coordinates are skipped. An empty species
/// list means every species.
pub async fn species_heatmap(
    pool: &SqlitePool,
    filter: &ObservationFilter,
) -> Result<Vec<HeatmapPoint>> {
    filter.validate()?;
    require_tables(pool, &[OBSERVATIONS, DEPLOYMENTS]).await?;

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT d.latitude, d.longitude, o.scientificName, COUNT(*) AS n
        FROM observations o
        JOIN deployments d ON d.deploymentID = o.deploymentID
        WHERE o.scientificName IS NOT NULL
          AND d.latitude IS NOT NULL
          AND d.longitude IS NOT NULL
        "#,
    );
    filter.push_conditions(&mut builder, "o.eventStart", "o.scientificName");
    builder.push(" GROUP BY d.latitude, d.longitude, o.scientificName");

    let rows = builder
        .build_query_as::<(String, String, String, i64)>()
        .fetch_all(pool)
        .await?;

    // "46.5" and "46.50" are the same place; merge on the parsed value
    let mut merged: HashMap<(String, u64, u64), HeatmapPoint> = HashMap::new();
    for (lat, lon, scientific_name, count) in rows {
        let (Some(latitude), Some(longitude)) = (
            parse_coordinate(Some(lat.as_str())),
            parse_coordinate(Some(lon.as_str())),
        ) else {
            continue;
        };
        // + 0.0 folds -0.0 into 0.0
        let key = (
            scientific_name.clone(),
            (latitude + 0.0).to_bits(),
            (longitude + 0.0).to_bits(),
        );
        merged
            .entry(key)
            .or_insert(HeatmapPoint {
                latitude,
                longitude,
                scientific_name,
                count: 0,
            })
            .count += count;
    }
    let mut points: Vec<HeatmapPoint> = merged.into_values().collect();

    points.sort_by(|a, b| {
        a.scientific_name
            .cmp(&b.scientific_name)
            .then(b.count.cmp(&a.count))
            .then(a.latitude.total_cmp(&b.latitude))
            .then(a.longitude.total_cmp(&b.longitude))
    });

    Ok(points)
}

/// Observation counts per hour of day (always 24 buckets)
pub async fn species_daily_activity(
    pool: &SqlitePool,
    species: &[String],
    dates: DateRange,
) -> Result<Vec<HourBucket>> {
    if species.is_empty() {
        return Err(Error::InvalidInput("at least one species is required".to_string()));
    }
    let filter = ObservationFilter {
        species: species.to_vec(),
        dates,
        ..ObservationFilter::default()
    };
    filter.validate()?;
    require_tables(pool, &[OBSERVATIONS]).await?;

    let hour = hour_expr("o.eventStart");
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {hour} AS hour, o.scientificName, COUNT(*) FROM observations o \
         WHERE length(o.eventStart) >= 13",
        hour = hour
    ));
    filter.push_conditions(&mut builder, "o.eventStart", "o.scientificName");
    builder.push(" GROUP BY hour, o.scientificName");

    let mut buckets: Vec<HourBucket> = (0..24)
        .map(|hour| HourBucket {
            hour,
            counts: species.iter().map(|s| (s.clone(), 0)).collect(),
        })
        .collect();

    for (hour, name, n) in builder
        .build_query_as::<(i64, String, i64)>()
        .fetch_all(pool)
        .await?
    {
        if let Some(bucket) = usize::try_from(hour).ok().and_then(|h| buckets.get_mut(h)) {
            *bucket.counts.entry(name).or_insert(0) += n;
        }
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::fixture_pool;
    use crate::queries::HourRange;
    use chrono::NaiveDate;

    fn vulpes_filter() -> ObservationFilter {
        ObservationFilter {
            species: vec!["Vulpes vulpes".to_string()],
            ..ObservationFilter::default()
        }
    }

    fn summarize(points: &[HeatmapPoint]) -> Vec<(f64, f64, i64)> {
        points.iter().map(|p| (p.latitude, p.longitude, p.count)).collect()
    }

    #[tokio::test]
    async fn test_heatmap_groups_by_coordinate() {
        let pool = fixture_pool().await;
        let points = species_heatmap(&pool, &vulpes_filter()).await.unwrap();

        // dep1 and dep3 share a location
        assert_eq!(summarize(&points), vec![(46.5, 6.5, 4), (46.6, 6.6, 2)]);
    }

    #[tokio::test]
    async fn test_heatmap_night_window_wraps_midnight() {
        let pool = fixture_pool().await;
        let filter = ObservationFilter {
            hours: HourRange::new(22, 7),
            ..vulpes_filter()
        };
        let points = species_heatmap(&pool, &filter).await.unwrap();

        assert_eq!(summarize(&points), vec![(46.5, 6.5, 3), (46.6, 6.6, 1)]);
    }

    #[tokio::test]
    async fn test_heatmap_date_range_is_inclusive() {
        let pool = fixture_pool().await;
        let filter = ObservationFilter {
            dates: DateRange {
                start: NaiveDate::from_ymd_opt(2023, 1, 9),
                end: NaiveDate::from_ymd_opt(2023, 1, 12),
            },
            ..vulpes_filter()
        };
        let points = species_heatmap(&pool, &filter).await.unwrap();

        assert_eq!(summarize(&points), vec![(46.5, 6.5, 1), (46.6, 6.6, 1)]);
    }

    #[tokio::test]
    async fn test_heatmap_skips_missing_coordinates() {
        let pool = fixture_pool().await;
        let filter = ObservationFilter {
            species: vec!["Meles meles".to_string()],
            ..ObservationFilter::default()
        };
        assert!(species_heatmap(&pool, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heatmap_all_species() {
        let pool = fixture_pool().await;
        let points = species_heatmap(&pool, &ObservationFilter::default()).await.unwrap();

        let total: i64 = points.iter().map(|p| p.count).sum();
        // Everything except the observation at dep4 (no coordinates)
        assert_eq!(total, 9);
        assert_eq!(points[0].scientific_name, "Capreolus capreolus");
    }

    #[tokio::test]
    async fn test_daily_activity_has_24_buckets() {
        let pool = fixture_pool().await;
        let species = vec!["Vulpes vulpes".to_string(), "Capreolus capreolus".to_string()];
        let buckets = species_daily_activity(&pool, &species, DateRange::default())
            .await
            .unwrap();

        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[6].counts["Vulpes vulpes"], 1);
        assert_eq!(buckets[6].counts["Capreolus capreolus"], 1);
        assert_eq!(buckets[5].counts["Capreolus capreolus"], 1);
        assert_eq!(buckets[0].counts["Vulpes vulpes"], 1);
        assert_eq!(buckets[3].counts["Vulpes vulpes"], 0);

        let vulpes_total: i64 = buckets.iter().map(|b| b.counts["Vulpes vulpes"]).sum();
        assert_eq!(vulpes_total, 6);
    }

    #[tokio::test]
    async fn test_daily_activity_date_filter_and_validation() {
        let pool = fixture_pool().await;
        let species = vec!["Vulpes vulpes".to_string()];
        let dates = DateRange {
            start: NaiveDate::from_ymd_opt(2023, 1, 20),
            end: None,
        };
        let buckets = species_daily_activity(&pool, &species, dates).await.unwrap();
        let total: i64 = buckets.iter().map(|b| b.counts["Vulpes vulpes"]).sum();
        assert_eq!(total, 1);
        assert_eq!(buckets[10].counts["Vulpes vulpes"], 1);

        assert!(matches!(
            species_daily_activity(&pool, &[], DateRange::default()).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_heatmap_merges_equal_coordinates_written_differently() {
        let pool = camtrap_common::db::open_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE deployments (deploymentID TEXT, latitude TEXT, longitude TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO deployments VALUES ('d1', '46.5', '6.5'), ('d2', '46.50', ' 6.500'), \
             ('d3', 'n/a', '6.5')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE observations (deploymentID TEXT, eventStart TEXT, scientificName TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO observations VALUES \
             ('d1', '2023-01-02T06:00:00Z', 'Vulpes vulpes'), \
             ('d2', '2023-01-03T06:00:00Z', 'Vulpes vulpes'), \
             ('d3', '2023-01-04T06:00:00Z', 'Vulpes vulpes')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let points = species_heatmap(&pool, &ObservationFilter::default()).await.unwrap();
        assert_eq!(summarize(&points), vec![(46.5, 6.5, 2)]);
    }
}
