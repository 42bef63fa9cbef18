//! Application configuration for ReportKit.
//!
//! User config lives at `~/.reportkit/reportkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReportKitError, Result};
use crate::types::DuplicateMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "reportkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".reportkit";

/// Upper bound on accepted import files (10 MiB).
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Config structs (matching reportkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batch import settings.
    #[serde(default)]
    pub import: ImportSection,

    /// Report store settings.
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[import]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSection {
    /// Files larger than this are rejected before parsing.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Rows persisted concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Time budget for each call into the report store.
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// Maximum number of row failures kept in the report.
    #[serde(default = "default_max_failure_details")]
    pub max_failure_details: usize,

    /// How rows that match an existing report are handled.
    #[serde(default)]
    pub duplicate_mode: DuplicateMode,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            concurrency: default_concurrency(),
            persist_timeout_ms: default_persist_timeout_ms(),
            max_failure_details: default_max_failure_details(),
            duplicate_mode: DuplicateMode::default(),
        }
    }
}

fn default_max_file_bytes() -> usize {
    DEFAULT_MAX_FILE_BYTES
}
fn default_concurrency() -> u32 {
    4
}
fn default_persist_timeout_ms() -> u64 {
    10_000
}
fn default_max_failure_details() -> usize {
    500
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Path of the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.reportkit/reports.db".into()
}

// ---------------------------------------------------------------------------
// Import config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime import configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Size cap checked before any decoding.
    pub max_file_bytes: usize,
    /// Worker pool size for row persistence.
    pub concurrency: usize,
    /// Per-call budget for report store calls.
    pub persist_timeout: Duration,
    /// Bound on the failure list returned to the caller.
    pub max_failure_details: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ImportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_file_bytes: config.import.max_file_bytes,
            concurrency: config.import.concurrency.max(1) as usize,
            persist_timeout: Duration::from_millis(config.import.persist_timeout_ms),
            max_failure_details: config.import.max_failure_details,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.reportkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReportKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.reportkit/reportkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportKitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ReportKitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReportKitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReportKitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReportKitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ReportKitError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_file_bytes"));
        assert!(toml_str.contains("duplicate_mode = \"update\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.import.max_file_bytes, DEFAULT_MAX_FILE_BYTES);
        assert_eq!(parsed.import.concurrency, 4);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[import]
duplicate_mode = "skip"
concurrency = 8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.import.duplicate_mode, DuplicateMode::Skip);
        assert_eq!(config.import.concurrency, 8);
        assert_eq!(config.import.persist_timeout_ms, 10_000);
        assert_eq!(config.storage.database_path, "~/.reportkit/reports.db");
    }

    #[test]
    fn import_config_from_app_config() {
        let mut app = AppConfig::default();
        app.import.concurrency = 0;
        let import = ImportConfig::from(&app);
        assert_eq!(import.concurrency, 1);
        assert_eq!(import.persist_timeout, Duration::from_secs(10));
        assert_eq!(import.max_failure_details, 500);
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home("/tmp/reports.db").unwrap(),
            PathBuf::from("/tmp/reports.db")
        );
    }
}
