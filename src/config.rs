//! Configuration for the feature tracker
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (tracker.toml)
//! - Environment variables (TRACKER_*)
//!
//! ## Example config file (tracker.toml):
//! ```toml
//! [store]
//! root = "."
//! dry_run = false
//!
//! [ids]
//! prefix = "FEAT"
//! width = 4
//!
//! [defaults]
//! owner = "unassigned"
//! priority = "medium"
//! complexity = "medium"
//! ```
//!
//! The loaded value is passed explicitly into each component constructor;
//! nothing in the crate reads configuration ambiently.

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::workflow::Status;

/// Main configuration for the tracker
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackerConfig {
    /// Store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Id allocation settings
    #[serde(default)]
    pub ids: IdConfig,

    /// Defaults applied to new and fixed records
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the tracker root (holds features/, templates/, schemas/, locks/)
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// When set, mutating operations report their effect without touching disk
    #[serde(default)]
    pub dry_run: bool,
}

/// Id allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    /// Prefix of every feature id
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Zero-pad width of the numeric part
    #[serde(default = "default_width")]
    pub width: usize,
}

/// Default field values for new records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Owner assigned when none is given
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Priority seeded into new records
    #[serde(default = "default_priority")]
    pub priority: String,

    /// Complexity seeded into new records
    #[serde(default = "default_complexity")]
    pub complexity: String,
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "FEAT".to_string()
}

fn default_width() -> usize {
    4
}

fn default_owner() -> String {
    "unassigned".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_complexity() -> String {
    "medium".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            dry_run: false,
        }
    }
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            width: default_width(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            priority: default_priority(),
            complexity: default_complexity(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["tracker.toml", ".tracker.toml", "config/tracker.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "tracker") {
            let xdg_config = config_dir.config_dir().join("tracker.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (TRACKER_*)
        builder = builder.add_source(
            Environment::with_prefix("TRACKER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Configuration rooted at a specific path, for embedding callers
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.store.root = root.into();
        config
    }

    /// Get the tracker root (resolves relative paths)
    pub fn root(&self) -> PathBuf {
        if self.store.root.is_absolute() {
            self.store.root.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.root)
        }
    }

    /// Directory holding the status subdirectories
    pub fn features_root(&self) -> PathBuf {
        self.root().join("features")
    }

    /// Directory a status maps to
    pub fn status_dir(&self, status: Status) -> PathBuf {
        self.features_root().join(status.dir_name())
    }

    /// Directory holding record templates
    pub fn templates_dir(&self) -> PathBuf {
        self.root().join("templates")
    }

    /// The canonical feature template
    pub fn template_path(&self) -> PathBuf {
        self.templates_dir().join("feature.md")
    }

    /// Directory holding machine-checkable schemas
    pub fn schemas_dir(&self) -> PathBuf {
        self.root().join("schemas")
    }

    /// The record schema consumed by the validator
    pub fn schema_path(&self) -> PathBuf {
        self.schemas_dir().join("feature.schema.json")
    }

    /// Directory holding advisory lock records
    pub fn locks_dir(&self) -> PathBuf {
        self.root().join("locks")
    }

    /// Render a numeric id in the configured scheme, e.g. 7 -> "FEAT-0007"
    pub fn format_id(&self, n: u64) -> String {
        format!("{}-{:0width$}", self.ids.prefix, n, width = self.ids.width)
    }
}
