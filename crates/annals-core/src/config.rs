//! Deployment configuration.
//!
//! Loaded from `annals.toml` next to the store; every field has a default
//! so a missing file means a default deployment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::policy::IntegrityLevel;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnalsConfig {
    /// Integrity tolerance enforced on imported logs.
    #[serde(default)]
    pub integrity: IntegrityLevel,

    /// Location of the history store database.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for AnnalsConfig {
    fn default() -> Self {
        Self {
            integrity: IntegrityLevel::default(),
            store_path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("annals.sqlite3")
}

/// Load configuration from `<root>/annals.toml`, falling back to defaults
/// when the file does not exist.
pub fn load_config(root: &Path) -> Result<AnnalsConfig> {
    let path = root.join("annals.toml");
    if !path.exists() {
        return Ok(AnnalsConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<AnnalsConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
