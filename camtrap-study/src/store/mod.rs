//! Study store: one SQLite database per imported study
//!
//! Layout: `<root>/studies/<study id>/study.db`. Study ids are UUIDs; any
//! other id is rejected before it reaches the filesystem.

use camtrap_common::config::RootFolderInitializer;
use camtrap_common::db::{connect_readonly, open_database, table_exists};
use camtrap_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::importer::{import_dataset, ImportOptions, ImportSummary, STUDY_INFO_TABLE};

/// Study metadata stored in `study_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StudySummary {
    pub study_id: String,
    pub name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub temporal_start: Option<String>,
    pub temporal_end: Option<String>,
    pub source_path: String,
    pub imported_at: String,
}

/// Handle to the studies under one root folder
///
/// Cheap to clone; read-only pools are cached and shared between clones.
#[derive(Clone)]
pub struct StudyStore {
    layout: RootFolderInitializer,
    pools: Arc<RwLock<HashMap<Uuid, SqlitePool>>>,
}

/// Parse and normalize a study id
pub fn parse_study_id(study_id: &str) -> Result<Uuid> {
    Uuid::parse_str(study_id.trim())
        .map_err(|_| Error::InvalidInput(format!("Invalid study id: {}", study_id)))
}

impl StudyStore {
    /// Open the store, creating `<root>/studies` if needed
    pub fn new(root_folder: PathBuf) -> Result<Self> {
        let layout = RootFolderInitializer::new(root_folder);
        layout.ensure_directory_exists()?;
        Ok(Self {
            layout,
            pools: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn root_folder(&self) -> &Path {
        self.layout.root_folder()
    }

    fn database_path(&self, id: &Uuid) -> PathBuf {
        self.layout.study_database_path(&id.to_string())
    }

    /// Import a Camtrap DP directory as a new study
    ///
    /// The study directory is removed again if the import fails.
    pub async fn import_study(&self, source_dir: &Path, options: &ImportOptions) -> Result<ImportSummary> {
        let id = Uuid::new_v4();
        let study_dir = self.layout.study_dir(&id.to_string());
        let db_path = self.database_path(&id);

        let result = async {
            let pool = open_database(&db_path).await?;
            let summary = import_dataset(&pool, source_dir, &id.to_string(), options).await;
            pool.close().await;
            summary
        }
        .await;

        if result.is_err() {
            if let Err(e) = tokio::fs::remove_dir_all(&study_dir).await {
                warn!("Failed to clean up {}: {}", study_dir.display(), e);
            }
        }
        result
    }

    /// All readable studies, most recently imported first
    pub async fn list_studies(&self) -> Result<Vec<StudySummary>> {
        let studies_dir = self.layout.studies_dir();
        let mut entries = tokio::fs::read_dir(&studies_dir).await?;
        let mut studies = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(id) = Uuid::parse_str(&name) else {
                continue;
            };
            match self.read_summary(&id).await {
                Ok(summary) => studies.push(summary),
                Err(e) => warn!("Skipping study {}: {}", name, e),
            }
        }

        studies.sort_by(|a, b| {
            b.imported_at
                .cmp(&a.imported_at)
                .then_with(|| a.study_id.cmp(&b.study_id))
        });
        Ok(studies)
    }

    pub async fn get_study(&self, study_id: &str) -> Result<StudySummary> {
        let id = parse_study_id(study_id)?;
        self.read_summary(&id).await
    }

    /// Change the display title of a study
    pub async fn rename_study(&self, study_id: &str, title: &str) -> Result<StudySummary> {
        let id = parse_study_id(study_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("title must not be empty".to_string()));
        }
        let db_path = self.existing_database_path(&id)?;

        let pool = open_database(&db_path).await?;
        let result = sqlx::query(&format!("UPDATE {} SET title = ?", STUDY_INFO_TABLE))
            .bind(title)
            .execute(&pool)
            .await;
        pool.close().await;
        result?;

        info!("Renamed study {} to '{}'", id, title);
        self.read_summary(&id).await
    }

    /// Delete a study and its database
    pub async fn delete_study(&self, study_id: &str) -> Result<()> {
        let id = parse_study_id(study_id)?;
        self.existing_database_path(&id)?;

        if let Some(pool) = self.pools.write().await.remove(&id) {
            pool.close().await;
        }
        tokio::fs::remove_dir_all(self.layout.study_dir(&id.to_string())).await?;

        info!("Deleted study {}", id);
        Ok(())
    }

    /// Read-only pool for running queries against a study
    pub async fn open_study(&self, study_id: &str) -> Result<SqlitePool> {
        let id = parse_study_id(study_id)?;
        self.pool_for(&id).await
    }

    async fn pool_for(&self, id: &Uuid) -> Result<SqlitePool> {
        if let Some(pool) = self.pools.read().await.get(id) {
            return Ok(pool.clone());
        }

        let db_path = self.existing_database_path(id)?;
        let mut pools = self.pools.write().await;
        // Another task may have connected while we waited for the lock
        if let Some(pool) = pools.get(id) {
            return Ok(pool.clone());
        }
        let pool = connect_readonly(&db_path).await?;
        pools.insert(*id, pool.clone());
        Ok(pool)
    }

    fn existing_database_path(&self, id: &Uuid) -> Result<PathBuf> {
        let db_path = self.database_path(id);
        if db_path.is_file() {
            Ok(db_path)
        } else {
            Err(Error::NotFound(format!("study {}", id)))
        }
    }

    /// Study metadata, through the cached pool when the study is open,
    /// otherwise over a connection that is closed again afterwards
    async fn read_summary(&self, id: &Uuid) -> Result<StudySummary> {
        let cached = self.pools.read().await.get(id).cloned();
        if let Some(pool) = cached {
            return query_summary(&pool, id).await;
        }

        let pool = connect_readonly(&self.existing_database_path(id)?).await?;
        let result = query_summary(&pool, id).await;
        pool.close().await;
        result
    }
}

async fn query_summary(pool: &SqlitePool, id: &Uuid) -> Result<StudySummary> {
    if !table_exists(pool, STUDY_INFO_TABLE).await? {
        return Err(Error::NotFound(format!("study metadata for {}", id)));
    }

    sqlx::query_as::<_, StudySummary>(&format!(
        "SELECT study_id, name, title, description, temporal_start, temporal_end, \
         source_path, imported_at FROM {} LIMIT 1",
        STUDY_INFO_TABLE
    ))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("study metadata for {}", id)))
}
