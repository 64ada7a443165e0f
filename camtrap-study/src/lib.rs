//! camtrap-study library - Camtrap DP study importer and query service
//!
//! Imports Camtrap DP datasets into per-study SQLite databases and serves
//! aggregation queries over a local JSON HTTP API.

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod importer;
pub mod pagination;
pub mod queries;
pub mod store;

use importer::ImportOptions;
use store::StudyStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: StudyStore,
    /// Settings applied to imports started over HTTP
    pub import: ImportOptions,
}

impl AppState {
    pub fn new(store: StudyStore, import: ImportOptions) -> Self {
        Self { store, import }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let studies = Router::new()
        .route("/api/studies", get(api::list_studies))
        .route("/api/studies/import", post(api::import_study))
        .route(
            "/api/studies/:id",
            get(api::get_study)
                .patch(api::rename_study)
                .delete(api::delete_study),
        );

    let queries = Router::new()
        .route("/api/studies/:id/species", get(api::species))
        .route("/api/studies/:id/deployments", get(api::deployments))
        .route(
            "/api/studies/:id/activity/deployments",
            get(api::deployments_activity),
        )
        .route(
            "/api/studies/:id/activity/locations",
            get(api::locations_activity),
        )
        .route(
            "/api/studies/:id/timeseries/top",
            get(api::top_species_timeseries),
        )
        .route("/api/studies/:id/timeseries", get(api::species_timeseries))
        .route("/api/studies/:id/heatmap", get(api::heatmap))
        .route("/api/studies/:id/daily-activity", get(api::daily_activity))
        .route("/api/studies/:id/media", get(api::media));

    Router::new()
        .merge(studies)
        .merge(queries)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
