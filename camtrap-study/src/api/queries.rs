//! Aggregation endpoints over one study
//!
//! Species lists are comma separated (`species=Vulpes vulpes,Sus scrofa`),
//! dates are `YYYY-MM-DD`, hours are integers. Empty parameters count as
//! absent.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::ApiError;
use crate::queries::activity::DEFAULT_PERIODS;
use crate::queries::timeseries::DEFAULT_TOP_SPECIES;
use crate::queries::{
    self, parse_date, parse_species_list, ActivityReport, DateRange, Deployment, HeatmapPoint,
    HourBucket, HourRange, MediaFilter, MediaPage, ObservationFilter, SpeciesCount, Timeseries,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub periods: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopSpeciesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeciesQuery {
    pub species: Option<String>,
}

/// Species / date / hour parameters shared by the filtered endpoints
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub species: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_hour: Option<String>,
    pub end_hour: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaQuery {
    pub species: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_hour: Option<String>,
    pub end_hour: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MediaQuery {
    fn filter(self) -> FilterQuery {
        FilterQuery {
            species: self.species,
            start_date: self.start_date,
            end_date: self.end_date,
            start_hour: self.start_hour,
            end_hour: self.end_hour,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_hour(field: &str, value: &str) -> Result<u32, ApiError> {
    value.parse().map_err(|_| {
        ApiError::BadRequest(format!("{} must be an hour of day, got '{}'", field, value))
    })
}

impl FilterQuery {
    fn species(&self) -> Vec<String> {
        non_empty(&self.species)
            .map(parse_species_list)
            .unwrap_or_default()
    }

    fn dates(&self) -> Result<DateRange, ApiError> {
        Ok(DateRange {
            start: non_empty(&self.start_date)
                .map(|v| parse_date("start_date", v))
                .transpose()?,
            end: non_empty(&self.end_date)
                .map(|v| parse_date("end_date", v))
                .transpose()?,
        })
    }

    fn hours(&self) -> Result<HourRange, ApiError> {
        Ok(HourRange {
            start: non_empty(&self.start_hour)
                .map(|v| parse_hour("start_hour", v))
                .transpose()?,
            end: non_empty(&self.end_hour)
                .map(|v| parse_hour("end_hour", v))
                .transpose()?,
        })
    }

    fn to_filter(&self) -> Result<ObservationFilter, ApiError> {
        Ok(ObservationFilter {
            species: self.species(),
            dates: self.dates()?,
            hours: self.hours()?,
        })
    }
}

/// GET /api/studies/:id/species
pub async fn species(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<Vec<SpeciesCount>>, ApiError> {
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::species_distribution(&pool).await?))
}

/// GET /api/studies/:id/deployments
pub async fn deployments(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::deployments(&pool).await?))
}

/// GET /api/studies/:id/activity/deployments
pub async fn deployments_activity(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<Json<ActivityReport>, ApiError> {
    let Query(query) = query?;
    let pool = state.store.open_study(&study_id).await?;
    let periods = query.periods.unwrap_or(DEFAULT_PERIODS);
    Ok(Json(queries::deployments_activity(&pool, periods).await?))
}

/// GET /api/studies/:id/activity/locations
pub async fn locations_activity(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<Json<ActivityReport>, ApiError> {
    let Query(query) = query?;
    let pool = state.store.open_study(&study_id).await?;
    let periods = query.periods.unwrap_or(DEFAULT_PERIODS);
    Ok(Json(queries::locations_activity(&pool, periods).await?))
}

/// GET /api/studies/:id/timeseries/top
pub async fn top_species_timeseries(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<TopSpeciesQuery>, QueryRejection>,
) -> Result<Json<Timeseries>, ApiError> {
    let Query(query) = query?;
    let pool = state.store.open_study(&study_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_SPECIES);
    Ok(Json(queries::top_species_timeseries(&pool, limit).await?))
}

/// GET /api/studies/:id/timeseries
pub async fn species_timeseries(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<SpeciesQuery>, QueryRejection>,
) -> Result<Json<Timeseries>, ApiError> {
    let Query(query) = query?;
    let species = non_empty(&query.species)
        .map(parse_species_list)
        .unwrap_or_default();
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::species_timeseries(&pool, &species).await?))
}

/// GET /api/studies/:id/heatmap
pub async fn heatmap(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Vec<HeatmapPoint>>, ApiError> {
    let Query(query) = query?;
    let filter = query.to_filter()?;
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::species_heatmap(&pool, &filter).await?))
}

/// GET /api/studies/:id/daily-activity
pub async fn daily_activity(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Vec<HourBucket>>, ApiError> {
    let Query(query) = query?;
    let species = query.species();
    let dates = query.dates()?;
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::species_daily_activity(&pool, &species, dates).await?))
}

/// GET /api/studies/:id/media
pub async fn media(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    query: Result<Query<MediaQuery>, QueryRejection>,
) -> Result<Json<MediaPage>, ApiError> {
    let Query(query) = query?;
    let (limit, offset) = (query.limit, query.offset);
    let filter = MediaFilter {
        observations: query.filter().to_filter()?,
        limit,
        offset,
    };
    let pool = state.store.open_study(&study_id).await?;
    Ok(Json(queries::latest_media(&pool, &filter).await?))
}
