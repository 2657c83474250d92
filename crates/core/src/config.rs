//! TOML-based configuration for PromptMerge.
//!
//! The configuration is an explicit value handed to the components that need
//! it (the merge workflow, the CLI); nothing reads it from global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Default template written by `promptmerge init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# PromptMerge configuration

[store]
# Directory holding promptmerge.db
data_dir = "~/.local/share/promptmerge"
log_level = "warn"

[merge]
# Reject merge inputs larger than this many bytes (unset = no limit).
# max_content_bytes = 1048576
# Strip surrounding whitespace from committed content.
trim_commit_content = true
"#;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store location and logging.
    #[serde(default)]
    pub store: StoreConfig,

    /// Merge workflow limits and behaviour.
    #[serde(default)]
    pub merge: MergeConfig,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Where the commit store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for the SQLite database. A leading `~` expands to the
    /// home directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("promptmerge"))
        .unwrap_or_else(|| PathBuf::from(".promptmerge"))
}
fn default_log_level() -> String {
    "warn".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Path of the database file, with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.data_dir).join("promptmerge.db")
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Upper bound on the size of each merge input, in bytes.
    #[serde(default)]
    pub max_content_bytes: Option<usize>,

    /// Trim leading and trailing whitespace from committed content.
    #[serde(default = "default_true")]
    pub trim_commit_content: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: None,
            trim_commit_content: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when `path` is the default
    /// location and no file exists there yet.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() && Some(path) == Self::default_path().as_deref() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// `~/.config/promptmerge/config.toml` on Linux, the platform equivalent
    /// elsewhere.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("promptmerge").join("config.toml"))
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }
        if self.merge.max_content_bytes == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "merge.max_content_bytes".into(),
                detail: "limit must be > 0 (omit it for no limit)".into(),
            });
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
