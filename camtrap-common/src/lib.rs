//! # Camtrap Common Library
//!
//! Shared code for the camtrap study service:
//! - Error type shared by the importer, query layer and API
//! - Configuration loading and root folder resolution
//! - SQLite connection helpers and identifier quoting

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
