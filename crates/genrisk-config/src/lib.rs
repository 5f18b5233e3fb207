//! Configuration loading for genrisk.
//! Reads genrisk.toml from the current directory or the path in GENRISK_CONFIG.
//! A missing file is not an error: every section has defaults.

use std::path::{Path, PathBuf};

use genrisk_common::{GenriskError, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "GENRISK_CONFIG";
pub const TRACKING_ROOT_ENV: &str = "GENRISK_TRACKING_ROOT";
pub const DEFAULT_CONFIG_FILE: &str = "genrisk.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub record: RecordConfig,
}

/// Where run records are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_tracking_root")]
    pub root: PathBuf,
    #[serde(default = "default_experiment_id")]
    pub experiment_id: String,
}

fn default_tracking_root() -> PathBuf { PathBuf::from("./mlruns") }
fn default_experiment_id() -> String  { "0".to_string() }

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            root: default_tracking_root(),
            experiment_id: default_experiment_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String { "genrisk=info,warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

/// Defaults applied when new run records are created from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    #[serde(default = "default_input_example_file")]
    pub input_example_file: String,
}

fn default_artifact_path()      -> String { "model".to_string() }
fn default_input_example_file() -> String { "input_example.json".to_string() }

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            input_example_file: default_input_example_file(),
        }
    }
}

impl Config {
    /// Load configuration from genrisk.toml.
    /// Checks GENRISK_CONFIG first, then the current directory, then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_tracking_root_override(std::env::var(TRACKING_ROOT_ENV).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| GenriskError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GenriskError::Config(e.to_string()))
    }

    fn apply_tracking_root_override(&mut self, root: Option<String>) {
        if let Some(root) = root.filter(|r| !r.trim().is_empty()) {
            tracing::debug!("Tracking root overridden by {TRACKING_ROOT_ENV}: {root}");
            self.tracking.root = PathBuf::from(root);
        }
    }
}
