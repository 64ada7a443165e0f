//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `CAMTRAP_ROOT_FOLDER`
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file never aborts startup: a warning is
//! logged and compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CAMTRAP_ROOT_FOLDER";

/// Default HTTP port for the study service
pub const DEFAULT_PORT: u16 = 5760;

/// Default number of rows per INSERT batch during import
pub const DEFAULT_BATCH_ROWS: usize = 500;

/// File name of the per-study database
pub const STUDY_DATABASE_FILE: &str = "study.db";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Contents of `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub import: ImportConfig,
    pub logging: LoggingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            host: defaults.host,
            port: defaults.port,
        }
    }
}

/// `[import]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows per multi-row INSERT statement
    pub batch_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: CompiledDefaults::for_current_platform().log_level,
        }
    }
}

impl TomlConfig {
    /// Parse a config file. Fails if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Parse config file content
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load the config file if present, otherwise compiled defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{} - using defaults", e);
                Self::default()
            }
        }
    }
}

/// Default config file location: `<config dir>/camtrap/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("camtrap").join("config.toml"))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\camtrap
        dirs::data_local_dir()
            .map(|d| d.join("camtrap"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\camtrap"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/camtrap
        dirs::data_dir()
            .map(|d| d.join("camtrap"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/camtrap"))
    } else {
        // ~/.local/share/camtrap
        dirs::data_local_dir()
            .map(|d| d.join("camtrap"))
            .unwrap_or_else(|| PathBuf::from("./camtrap_data"))
    }
}

/// Resolves the root folder holding all imported studies
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_path: default_config_path(),
        }
    }

    /// Root folder given on the command line, if any
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Override the config file location
    pub fn with_config_path(mut self, config_path: PathBuf) -> Self {
        self.config_path = Some(config_path);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            debug!("[{}] root folder from command line", self.module_name);
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                debug!("[{}] root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        let config = TomlConfig::load_or_default(self.config_path.as_deref());
        if let Some(root_folder) = config.root_folder {
            debug!("[{}] root folder from config file", self.module_name);
            return root_folder;
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout and computes study paths
///
/// Layout: `<root>/studies/<study id>/study.db`
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create `<root>/studies` if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.studies_dir())?;
        Ok(())
    }

    pub fn studies_dir(&self) -> PathBuf {
        self.root_folder.join("studies")
    }

    pub fn study_dir(&self, study_id: &str) -> PathBuf {
        self.studies_dir().join(study_id)
    }

    pub fn study_database_path(&self, study_id: &str) -> PathBuf {
        self.study_dir(study_id).join(STUDY_DATABASE_FILE)
    }
}
