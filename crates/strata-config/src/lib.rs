//! # strata-config
//!
//! Configuration management for Strata store files.
//!
//! Loads configuration from:
//! 1. `~/.strata/config.toml` (global)
//! 2. `.strata/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Default root directory of the storage tree
pub const DEFAULT_ROOT_DIR: &str = "/var/lib/strata";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub cache: CacheConfig,
    pub local_fs: LocalFsConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.strata/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Load project config (.strata/config.toml) - overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::load_file(&project_path)?);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single config file without merging or env overrides.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.strata/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".strata/config.toml"))
    }

    /// Project config path: .strata/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".strata/config.toml")
    }

    /// Merge another config (project overrides).
    ///
    /// A section replaces ours only when it differs from its defaults.
    pub fn merge(&mut self, other: Config) {
        if other.layout != LayoutConfig::default() {
            self.layout = other.layout;
        }
        if other.cache != CacheConfig::default() {
            self.cache = other.cache;
        }
        if other.local_fs != LocalFsConfig::default() {
            self.local_fs = other.local_fs;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STRATA_ROOT_DIR") {
            self.layout.root_dir = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("STRATA_BLOCK_SIZE") {
            if let Ok(n) = size.parse() {
                self.local_fs.block_size = n;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }

    /// Render this config as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Directory layout of the storage tree.
///
/// Store files live at `<root_dir>/<data_dir>/<namespace>/<table>/<region>/<family>/<file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Root of the storage tree
    pub root_dir: PathBuf,
    /// Live table data, relative to the root
    pub data_dir: String,
    /// Archived (compacted away but still linked) files, relative to the root
    pub archive_dir: String,
    /// In-flight files, relative to the root
    pub temp_dir: String,
    /// Namespace used when a link name carries none
    pub default_namespace: String,
    /// Number of parents from a store file up to its table directory
    pub table_dir_depth: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            data_dir: "data".to_string(),
            archive_dir: "archive".to_string(),
            temp_dir: ".tmp".to_string(),
            default_namespace: "default".to_string(),
            table_dir_depth: 3,
        }
    }
}

impl LayoutConfig {
    /// Layout rooted at `root_dir` with every other setting at its default.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// `<root>/<data>`
    pub fn data_root(&self) -> PathBuf {
        self.root_dir.join(&self.data_dir)
    }

    /// `<root>/<archive>/<data>`
    pub fn archive_root(&self) -> PathBuf {
        self.root_dir.join(&self.archive_dir).join(&self.data_dir)
    }

    /// `<root>/<temp>/<data>`
    pub fn temp_root(&self) -> PathBuf {
        self.root_dir.join(&self.temp_dir).join(&self.data_dir)
    }

    /// `<root>/<data>/<namespace>/<table>`
    pub fn table_dir(&self, namespace: &str, table: &str) -> PathBuf {
        self.data_root().join(namespace).join(table)
    }

    /// `<root>/<data>/<namespace>/<table>/<region>/<family>`
    pub fn family_dir(&self, namespace: &str, table: &str, region: &str, family: &str) -> PathBuf {
        self.table_dir(namespace, table).join(region).join(family)
    }
}

/// Cache/read context handed to reader construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Buffer size wrapped around every opened stream
    pub read_buffer_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 64 * 1024,
        }
    }
}

/// Local filesystem accessor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFsConfig {
    /// Block size used to tile files into block locations
    pub block_size: u64,
    /// Hosts reported as holding every local block
    pub hosts: Vec<String>,
}

impl Default for LocalFsConfig {
    fn default() -> Self {
        Self {
            block_size: 128 * 1024 * 1024,
            hosts: vec!["localhost".to_string()],
        }
    }
}
