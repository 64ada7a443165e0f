//! Study-wide counts

use camtrap_common::db::{list_tables, TableInfo};
use camtrap_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::importer::STUDY_INFO_TABLE;

use super::{DEPLOYMENTS, MEDIA, OBSERVATIONS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyOverview {
    /// Imported tables with row counts
    pub tables: Vec<TableInfo>,
    pub observation_count: i64,
    pub media_count: i64,
    pub species_count: i64,
    pub deployment_count: i64,
    pub location_count: i64,
    pub first_observation: Option<String>,
    pub last_observation: Option<String>,
}

/// Row counts and distinct counts over whichever Camtrap DP tables exist
pub async fn study_overview(pool: &SqlitePool) -> Result<StudyOverview> {
    let tables: Vec<TableInfo> = list_tables(pool)
        .await?
        .into_iter()
        .filter(|t| t.name != STUDY_INFO_TABLE)
        .collect();
    let row_count = |name: &str| {
        tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.row_count)
            .unwrap_or(0)
    };
    let has = |name: &str| tables.iter().any(|t| t.name == name);

    let mut overview = StudyOverview {
        observation_count: row_count(OBSERVATIONS),
        media_count: row_count(MEDIA),
        species_count: 0,
        deployment_count: 0,
        location_count: 0,
        first_observation: None,
        last_observation: None,
        tables: Vec::new(),
    };

    if has(OBSERVATIONS) {
        // Earliest and latest by instant; the stored string is returned as is
        let (species, first, last): (i64, Option<String>, Option<String>) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT scientificName) FROM observations),
                (SELECT eventStart FROM observations
                 WHERE julianday(eventStart) IS NOT NULL
                 ORDER BY julianday(eventStart) ASC, eventStart ASC LIMIT 1),
                (SELECT eventStart FROM observations
                 WHERE julianday(eventStart) IS NOT NULL
                 ORDER BY julianday(eventStart) DESC, eventStart DESC LIMIT 1)
            "#,
        )
        .fetch_one(pool)
        .await?;
        overview.species_count = species;
        overview.first_observation = first;
        overview.last_observation = last;
    }

    if has(DEPLOYMENTS) {
        let (deployments, locations): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT deploymentID),
                   COUNT(DISTINCT COALESCE(locationID, locationName))
            FROM deployments
            "#,
        )
        .fetch_one(pool)
        .await?;
        overview.deployment_count = deployments;
        overview.location_count = locations;
    }

    overview.tables = tables;
    Ok(overview)
}
