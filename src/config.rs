//! Factory configuration
//!
//! Loaded from a JSON file. Missing keys fall back to the built-in layout of
//! the default languages directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::templates::TemplateTable;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryConfig {
    /// Directory the template locations are relative to.
    #[serde(default = "default_language_root")]
    pub language_root: PathBuf,
    /// Parent of the per-run rekey directories.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_hc_binary")]
    pub hc_binary: PathBuf,
    /// Manifest key (dotted path) that receives the uniqueness value.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    #[serde(default)]
    pub templates: TemplateTable,
}

fn default_language_root() -> PathBuf {
    PathBuf::from("languages")
}

fn default_hc_binary() -> PathBuf {
    PathBuf::from("hc")
}

fn default_identity_field() -> String {
    "uuid".to_string()
}

impl FactoryConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_language_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.language_root = root.into();
        self
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("langforge"))
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            language_root: default_language_root(),
            work_dir: None,
            hc_binary: default_hc_binary(),
            identity_field: default_identity_field(),
            templates: TemplateTable::default(),
        }
    }
}
