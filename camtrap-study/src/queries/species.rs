//! Species counts and the deployment list

use camtrap_common::db::require_tables;
use camtrap_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{parse_coordinate, DEPLOYMENTS, OBSERVATIONS};

/// Number of observations of one species
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeciesCount {
    pub scientific_name: String,
    pub count: i64,
}

/// One camera deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: String,
    pub location_id: Option<String>,
    pub location_name: Option<String>,
    pub deployment_start: Option<String>,
    pub deployment_end: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Observation count per species, most observed first
pub async fn species_distribution(pool: &SqlitePool) -> Result<Vec<SpeciesCount>> {
    require_tables(pool, &[OBSERVATIONS]).await?;

    let counts = sqlx::query_as::<_, SpeciesCount>(
        r#"
        SELECT scientificName AS scientific_name, COUNT(*) AS count
        FROM observations
        WHERE scientificName IS NOT NULL
        GROUP BY scientificName
        ORDER BY count DESC, scientificName ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(counts)
}

/// Distinct deployments ordered by start
pub async fn deployments(pool: &SqlitePool) -> Result<Vec<Deployment>> {
    require_tables(pool, &[DEPLOYMENTS]).await?;

    type Row = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT deploymentID,
               MIN(locationID),
               MIN(locationName),
               MIN(deploymentStart),
               MAX(deploymentEnd),
               MIN(latitude),
               MIN(longitude)
        FROM deployments
        WHERE deploymentID IS NOT NULL
        GROUP BY deploymentID
        ORDER BY MIN(deploymentStart) ASC, deploymentID ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, location_id, location_name, start, end, lat, lon)| Deployment {
            deployment_id: id,
            location_id,
            location_name,
            deployment_start: start,
            deployment_end: end,
            latitude: parse_coordinate(lat.as_deref()),
            longitude: parse_coordinate(lon.as_deref()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::fixture_pool;
    use camtrap_common::db::open_in_memory;
    use camtrap_common::Error;

    #[tokio::test]
    async fn test_species_distribution() {
        let pool = fixture_pool().await;
        let counts = species_distribution(&pool).await.unwrap();

        let pairs: Vec<(&str, i64)> = counts
            .iter()
            .map(|c| (c.scientific_name.as_str(), c.count))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Vulpes vulpes", 6),
                ("Capreolus capreolus", 2),
                ("Meles meles", 1),
                ("Sus scrofa", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_deployments() {
        let pool = fixture_pool().await;
        let deployments = deployments(&pool).await.unwrap();

        let ids: Vec<&str> = deployments.iter().map(|d| d.deployment_id.as_str()).collect();
        assert_eq!(ids, vec!["dep1", "dep2", "dep4", "dep3"]);

        assert_eq!(deployments[0].latitude, Some(46.5));
        assert_eq!(deployments[0].location_name.as_deref(), Some("North Ridge"));
        // dep4 has no coordinates
        assert_eq!(deployments[2].latitude, None);
        assert_eq!(deployments[2].longitude, None);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let pool = open_in_memory().await.unwrap();
        assert!(matches!(
            species_distribution(&pool).await,
            Err(Error::NotFound(msg)) if msg == "table observations"
        ));
    }
}
