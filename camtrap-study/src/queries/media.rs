//! Latest media, newest first

use camtrap_common::db::{quote_ident, require_tables, table_columns, table_exists};
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{ObservationFilter, MEDIA, OBSERVATIONS};
use crate::pagination::calculate_pagination;

/// Media query: observation filter plus paging
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub observations: ObservationFilter,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub media_id: String,
    pub deployment_id: Option<String>,
    pub timestamp: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_mediatype: Option<String>,
    /// Species observed on this media, sorted
    pub scientific_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPage {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
    pub items: Vec<MediaItem>,
}

/// Separator for species names packed by `group_concat` (ASCII unit separator)
const NAME_SEPARATOR: char = '\u{1f}';

/// Media with the species observed on them, newest timestamp first
///
/// Date and hour filters apply to the media timestamp. The species filter
/// selects media with at least one matching observation; the species list of
/// each item is always complete.
pub async fn latest_media(pool: &SqlitePool, filter: &MediaFilter) -> Result<MediaPage> {
    filter.observations.validate()?;
    require_tables(pool, &[MEDIA]).await?;

    let has_observations = table_exists(pool, OBSERVATIONS).await?;
    if !has_observations && !filter.observations.species.is_empty() {
        return Err(Error::NotFound(format!("table {}", OBSERVATIONS)));
    }

    let columns = table_columns(pool, MEDIA).await?;
    for required in ["mediaID", "timestamp"] {
        if !columns.iter().any(|c| c == required) {
            return Err(Error::NotFound(format!("column {}.{}", MEDIA, required)));
        }
    }
    // Optional Camtrap DP columns select as NULL when absent
    let column = |name: &str| -> String {
        if columns.iter().any(|c| c == name) {
            format!("m.{}", quote_ident(name))
        } else {
            "NULL".to_string()
        }
    };

    let page = calculate_pagination(filter.limit, filter.offset);

    let time_filter = ObservationFilter {
        species: Vec::new(),
        ..filter.observations.clone()
    };
    let species = &filter.observations.species;
    let push_from_where = |builder: &mut QueryBuilder<'_, Sqlite>| {
        builder.push(" FROM media m WHERE m.mediaID IS NOT NULL");
        time_filter.push_conditions(builder, "m.timestamp", "NULL");
        if !species.is_empty() {
            builder.push(
                " AND m.mediaID IN (SELECT mediaID FROM observations WHERE scientificName IN (",
            );
            let mut list = builder.separated(", ");
            for name in species {
                list.push_bind(name.clone());
            }
            list.push_unseparated("))");
        }
    };

    let mut count_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(DISTINCT m.mediaID)");
    push_from_where(&mut count_builder);
    let total: i64 = count_builder
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    let species_column = if has_observations {
        "(SELECT group_concat(o.scientificName, char(31)) FROM observations o \
         WHERE o.mediaID = m.mediaID AND o.scientificName IS NOT NULL)"
    } else {
        "NULL"
    };
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT m.mediaID, {}, m.timestamp, {}, {}, {}, {}",
        column("deploymentID"),
        column("filePath"),
        column("fileName"),
        column("fileMediatype"),
        species_column
    ));
    push_from_where(&mut builder);
    // Offsets differ between deployments; compare instants, not strings
    builder.push(
        " GROUP BY m.mediaID \
         ORDER BY julianday(m.timestamp) DESC, m.timestamp DESC, m.mediaID ASC LIMIT ",
    );
    builder.push_bind(page.limit);
    builder.push(" OFFSET ");
    builder.push_bind(page.offset);

    type Row = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );
    let rows = builder.build_query_as::<Row>().fetch_all(pool).await?;

    let items = rows
        .into_iter()
        .map(
            |(media_id, deployment_id, timestamp, file_path, file_name, file_mediatype, species)| {
                let mut scientific_names: Vec<String> = species
                    .map(|s| s.split(NAME_SEPARATOR).map(str::to_string).collect())
                    .unwrap_or_default();
                scientific_names.sort();
                scientific_names.dedup();
                MediaItem {
                    media_id,
                    deployment_id,
                    timestamp,
                    file_path,
                    file_name,
                    file_mediatype,
                    scientific_names,
                }
            },
        )
        .collect();

    Ok(MediaPage {
        total,
        limit: page.limit,
        offset: page.offset,
        has_more: page.has_more(total),
        items,
    })
}
