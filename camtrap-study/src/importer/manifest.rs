//! Camtrap DP manifest (`datapackage.json`)
//!
//! Only the descriptive fields used for study metadata are typed. The full
//! document is kept verbatim in [`DataPackage::raw`] and stored with the study.

use camtrap_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest file name inside a Camtrap DP directory
pub const MANIFEST_FILE: &str = "datapackage.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataPackage {
    pub name: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub created: Option<String>,
    pub contributors: Vec<Contributor>,
    pub licenses: Vec<License>,
    pub temporal: Option<Temporal>,
    pub spatial: Option<Value>,
    pub taxonomic: Vec<Taxon>,
    pub project: Option<Value>,
    pub resources: Vec<Resource>,

    /// Original document, unknown fields included
    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contributor {
    pub title: Option<String>,
    pub email: Option<String>,
    pub path: Option<String>,
    pub role: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct License {
    pub name: Option<String>,
    pub path: Option<String>,
    pub title: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Temporal {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Taxon {
    pub scientific_name: Option<String>,
    #[serde(rename = "taxonID")]
    pub taxon_id: Option<String>,
    pub taxon_rank: Option<String>,
    pub vernacular_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub name: Option<String>,
    /// A single path or a list of paths
    pub path: Option<Value>,
    pub profile: Option<String>,
}

impl DataPackage {
    /// Parse a manifest document
    pub fn from_json(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::InvalidInput(format!(
                "{} must contain a JSON object",
                MANIFEST_FILE
            )));
        }
        let mut package: DataPackage = serde_json::from_value(raw.clone()).map_err(|e| {
            Error::InvalidInput(format!("Malformed {}: {}", MANIFEST_FILE, e))
        })?;
        package.raw = raw;
        Ok(package)
    }

    /// Display title: `title`, then `name`, then the given fallback
    pub fn display_title(&self, fallback: &str) -> String {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Read `datapackage.json` from a dataset directory
///
/// Returns `None` when the directory has no manifest; a manifest that
/// exists but cannot be parsed is an error.
pub fn read_manifest(dir: &Path) -> Result<Option<DataPackage>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)?;
    let raw: Value = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("Malformed {}: {}", MANIFEST_FILE, e)))?;

    DataPackage::from_json(raw).map(Some)
}
