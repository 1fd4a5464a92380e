//! Engine configuration
//!
//! Loaded from a JSON file, then overridden from the environment:
//! `CANON_DB_PATH` sets the SQLite path, `CANON_LOG` the log filter.

use crate::error::{EngineError, Result};
use crate::mapping::SourceType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DB_PATH_ENV: &str = "CANON_DB_PATH";
pub const LOG_FILTER_ENV: &str = "CANON_LOG";

/// Normalization engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite mapping store; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
    /// Source type assumed when a caller does not say
    pub default_source_type: SourceType,
    /// Fill `exchange` from the vendor name when no rule supplies it
    pub derive_exchange_field: bool,
    /// Write the builtin catalog into an empty database
    pub seed_default_catalog: bool,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            default_source_type: SourceType::Websocket,
            derive_exchange_field: true,
            seed_default_catalog: true,
            log_filter: "canonical_normalizer=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(self) -> Self {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = var(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(filter) = var(LOG_FILTER_ENV).filter(|f| !f.trim().is_empty()) {
            self.log_filter = filter;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_filter.trim().is_empty() {
            return Err(EngineError::Config("log_filter must not be empty".to_string()));
        }
        if let Some(path) = &self.database_path {
            if path.is_dir() {
                return Err(EngineError::Config(format!(
                    "database_path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
