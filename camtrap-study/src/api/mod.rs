//! HTTP API handlers for camtrap-study

pub mod error;
pub mod health;
pub mod queries;
pub mod studies;

pub use error::ApiError;
pub use health::health_routes;
pub use queries::{
    daily_activity, deployments, deployments_activity, heatmap, locations_activity, media,
    species, species_timeseries, top_species_timeseries,
};
pub use studies::{delete_study, get_study, import_study, list_studies, rename_study};
