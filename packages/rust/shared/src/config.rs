//! Application configuration.
//!
//! User config lives at `~/.lineage/lineage.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LineageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lineage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lineage";

// ---------------------------------------------------------------------------
// Config structs (matching lineage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Staging area settings.
    #[serde(default)]
    pub staging: StagingConfig,

    /// Move behaviour.
    #[serde(default)]
    pub moves: MovesConfig,

    /// Allowed parent types per contact type.
    #[serde(default = "default_hierarchy")]
    pub hierarchy: BTreeMap<String, Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            staging: StagingConfig::default(),
            moves: MovesConfig::default(),
            hierarchy: default_hierarchy(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "var/lineage.db".into()
}

/// `[staging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Directory receiving one `<id>.doc.json` per staged document.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "json_docs".into()
}

/// `[moves]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovesConfig {
    /// Maximum in-flight store reads during discovery.
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: u32,

    /// Reject parents whose type is not allowed by `[hierarchy]`.
    #[serde(default = "default_true")]
    pub enforce_hierarchy: bool,
}

impl Default for MovesConfig {
    fn default() -> Self {
        Self {
            read_concurrency: default_read_concurrency(),
            enforce_hierarchy: true,
        }
    }
}

fn default_read_concurrency() -> u32 {
    8
}
fn default_true() -> bool {
    true
}

fn default_hierarchy() -> BTreeMap<String, Vec<String>> {
    let places = ["district_hospital", "health_center", "clinic"];
    BTreeMap::from([
        ("district_hospital".to_string(), Vec::new()),
        ("health_center".to_string(), vec!["district_hospital".to_string()]),
        ("clinic".to_string(), vec!["health_center".to_string()]),
        ("person".to_string(), places.iter().map(|p| p.to_string()).collect()),
    ])
}

// ---------------------------------------------------------------------------
// Move config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime move configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct MoveConfig {
    /// Maximum in-flight store reads.
    pub read_concurrency: usize,
    /// Whether parent-type rules are enforced.
    pub enforce_hierarchy: bool,
    /// Allowed parent types per contact type.
    pub allowed_parents: BTreeMap<String, Vec<String>>,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MoveConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            read_concurrency: config.moves.read_concurrency.max(1) as usize,
            enforce_hierarchy: config.moves.enforce_hierarchy,
            allowed_parents: config.hierarchy.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lineage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LineageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lineage/lineage.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LineageError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LineageError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LineageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LineageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LineageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
