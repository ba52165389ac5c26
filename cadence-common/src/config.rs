//! Bootstrap configuration loading and root folder resolution
//!
//! Only bootstrap concerns live here (where the database is, how to log).
//! Runtime tuning such as debounce windows is read from the `settings` table
//! by the crate that owns it.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CADENCE_ROOT_FOLDER";

/// Database file name used when the TOML file does not name one
pub const DATABASE_FILE_NAME: &str = "cadence.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// SQLite database path; relative paths are resolved against the root folder
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let toml_str = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        let config = Self::from_toml_str(&toml_str)?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    /// or unreadable. A missing config file never prevents startup.
    pub async fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => path,
            None => {
                warn!("No config file location available, using built-in defaults");
                return Self::default();
            }
        };

        if !path.exists() {
            warn!("Config file {:?} not found, using built-in defaults", path);
            return Self::default();
        }

        match Self::load(&path).await {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Self::default()
            }
        }
    }

    /// Resolve the database path for this configuration
    pub fn resolve_database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join(DATABASE_FILE_NAME),
        }
    }
}

/// Root folder resolution, in priority order:
/// 1. Explicit argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(explicit: Option<&Path>, config: Option<&TomlConfig>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(root_folder) = config.and_then(|c| c.root_folder.clone()) {
        return root_folder;
    }

    default_root_folder()
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/cadence
        dirs::data_local_dir()
            .map(|d| d.join("cadence"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/cadence"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/cadence
        dirs::data_dir()
            .map(|d| d.join("cadence"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/cadence"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\cadence
        dirs::data_local_dir()
            .map(|d| d.join("cadence"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\cadence"))
    } else {
        PathBuf::from("./cadence_data")
    }
}
