//! User-facing history configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on snapshots kept per file.
pub const DEFAULT_MAX_SNAPSHOTS_PER_FILE: usize = 50;

/// Recognized history options.
///
/// Keys use the host's camelCase names, so a TOML file looks like:
///
/// ```toml
/// enabled = true
/// maxSnapshotsPerFile = 20
/// excludeGlobs = ["**/target/**"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    /// Gates capture.
    pub enabled: bool,

    /// Bucket cap; oldest snapshots beyond it are dropped on insert.
    pub max_snapshots_per_file: usize,

    /// Allow-list. `**/*` allows everything.
    pub include_globs: Vec<String>,

    /// Deny-list, checked before the allow-list.
    pub exclude_globs: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_snapshots_per_file: DEFAULT_MAX_SNAPSHOTS_PER_FILE,
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/*.log".to_string(),
            ],
        }
    }
}

impl HistoryConfig {
    /// Parse from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: HistoryConfig = toml::from_str(s)?;
        Ok(config.normalized())
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Cap clamped to at least one snapshot.
    pub fn normalized(mut self) -> Self {
        self.max_snapshots_per_file = self.max_snapshots_per_file.max(1);
        self
    }
}
