//! Configuration loading.
//!
//! Lookup order: an explicit `--config` path (must exist), otherwise
//! `<config dir>/batch-review/config.toml` when present, otherwise built-in
//! defaults. The resulting [`Config`] is handed to each component at
//! construction; nothing reads configuration from global state afterwards.

pub mod schema;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

pub use schema::{
    BodyRendering, CollectorConfig, Config, ModelConfig, ReportConfig, ReviewConfig,
    SafetyThreshold, SqlConfig, WriteMode,
};

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "batch-review").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Expand `~` and `$VAR` in a configured path. Unknown variables leave the
/// input untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

impl Config {
    /// Load from `explicit` or the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
