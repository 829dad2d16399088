//! Layered per-trik secrets.
//!
//! Secrets live in `secrets.json` files keyed by trik id, with the
//! project-local file overriding the user-global one. A trik only ever sees
//! keys its manifest declares; undeclared keys are invisible even when the
//! files contain them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use trikhub_manifest::TrikManifest;

use crate::ConfigError;

type SecretsByTrik = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Clone, Debug, Default)]
pub struct ConfigStoreOptions {
    pub global_path: Option<PathBuf>,
    pub local_path: Option<PathBuf>,
}

/// Two-layer secret store: project-local overrides global.
pub struct ConfigStore {
    global_path: Option<PathBuf>,
    local_path: Option<PathBuf>,
    global: SecretsByTrik,
    local: SecretsByTrik,
}

impl ConfigStore {
    pub fn new(options: ConfigStoreOptions) -> Self {
        Self {
            global_path: options.global_path,
            local_path: options.local_path,
            global: SecretsByTrik::new(),
            local: SecretsByTrik::new(),
        }
    }

    /// An empty store for tests or gateways without secrets on disk.
    pub fn empty() -> Self {
        Self::new(ConfigStoreOptions::default())
    }

    /// In-memory store seeded programmatically (tests, embedded use).
    pub fn with_secrets(secrets: SecretsByTrik) -> Self {
        let mut store = Self::empty();
        store.local = secrets;
        store
    }

    /// Load both layers from disk. Missing files are fine; malformed files
    /// are skipped with a warning so one bad file cannot take the gateway
    /// down.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        self.global = Self::read_layer(self.global_path.as_deref());
        self.local = Self::read_layer(self.local_path.as_deref());
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.load()
    }

    fn read_layer(path: Option<&Path>) -> SecretsByTrik {
        let Some(path) = path else {
            return SecretsByTrik::new();
        };
        if !path.exists() {
            return SecretsByTrik::new();
        }
        match std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|text| serde_json::from_str(&text).map_err(ConfigError::from))
        {
            Ok(secrets) => secrets,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load secrets file");
                SecretsByTrik::new()
            }
        }
    }

    /// Build the config context a trik is allowed to see: declared keys only,
    /// local layer over global, manifest defaults filling the gaps.
    pub fn context_for(&self, manifest: &TrikManifest) -> TrikConfigContext {
        let mut values = BTreeMap::new();
        let mut defaults = BTreeMap::new();

        let Some(spec) = &manifest.config else {
            return TrikConfigContext { values, defaults };
        };

        let global = self.global.get(&manifest.id);
        let local = self.local.get(&manifest.id);

        for key in spec.declared_keys() {
            let value = local
                .and_then(|layer| layer.get(key))
                .or_else(|| global.and_then(|layer| layer.get(key)));
            if let Some(value) = value {
                values.insert(key.to_string(), value.clone());
            }
        }

        if let Some(optional) = &spec.optional {
            for requirement in optional {
                if let Some(default) = &requirement.default {
                    defaults.insert(requirement.key.clone(), default.clone());
                }
            }
        }

        TrikConfigContext { values, defaults }
    }

    /// Required keys the store cannot satisfy for this manifest.
    pub fn missing_required(&self, manifest: &TrikManifest) -> Vec<String> {
        let context = self.context_for(manifest);
        let Some(spec) = &manifest.config else {
            return Vec::new();
        };
        let Some(required) = &spec.required else {
            return Vec::new();
        };
        required
            .iter()
            .filter(|requirement| !context.has(&requirement.key))
            .map(|requirement| requirement.key.clone())
            .collect()
    }

    /// Trik ids with secrets in either layer.
    pub fn configured_triks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .global
            .keys()
            .chain(self.local.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// The view of configuration a single trik receives.
#[derive(Clone, Debug, Default)]
pub struct TrikConfigContext {
    values: BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
}

impl TrikConfigContext {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .or_else(|| self.defaults.get(key))
            .map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.defaults.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .values
            .keys()
            .chain(self.defaults.keys())
            .map(String::as_str)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Flatten to the wire map handed to workers.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.defaults.clone();
        map.extend(self.values.clone());
        map
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.defaults.is_empty()
    }
}
