//! The registry config file at `<root>/.trikhub/config.json`: the declared
//! list of installed triks, their registry-managed versions, and the recorded
//! per-trik runtime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub triks: Vec<String>,
    /// Versions for registry-managed triks, keyed by package name.
    #[serde(default)]
    pub trikhub: BTreeMap<String, String>,
    /// Recorded runtime per trik ("node" | "python").
    #[serde(default)]
    pub runtimes: BTreeMap<String, String>,
}

impl RegistryConfig {
    /// Conventional path under a project root.
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(".trikhub").join("config.json")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save atomically via temp file + rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn runtime_of(&self, name: &str) -> Option<&str> {
        self.runtimes.get(name).map(String::as_str)
    }
}
