//! Study management: list, import, inspect, rename, delete

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::ApiError;
use crate::importer::ImportSummary;
use crate::queries::{study_overview, StudyOverview};
use crate::store::StudySummary;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Dataset directory on the server's filesystem
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

/// Study metadata plus table counts
#[derive(Debug, Serialize)]
pub struct StudyDetail {
    #[serde(flatten)]
    pub study: StudySummary,
    pub overview: StudyOverview,
}

/// GET /api/studies
pub async fn list_studies(State(state): State<AppState>) -> Result<Json<Vec<StudySummary>>, ApiError> {
    Ok(Json(state.store.list_studies().await?))
}

/// POST /api/studies/import
pub async fn import_study(
    State(state): State<AppState>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let Json(request) = body?;
    info!("Import requested for {}", request.path.display());

    let summary = state.store.import_study(&request.path, &state.import).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/studies/:id
pub async fn get_study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<Json<StudyDetail>, ApiError> {
    let study = state.store.get_study(&study_id).await?;
    let pool = state.store.open_study(&study_id).await?;
    let overview = study_overview(&pool).await?;
    Ok(Json(StudyDetail { study, overview }))
}

/// PATCH /api/studies/:id
pub async fn rename_study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<StudySummary>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.store.rename_study(&study_id, &request.title).await?))
}

/// DELETE /api/studies/:id
pub async fn delete_study(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_study(&study_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
