//! The per-trik storage handle given to skill code.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::DEFAULT_MAX_SIZE_BYTES;

/// Storage scoped to a single trik. Skill code cannot name another trik's
/// namespace through this handle, which is the whole isolation story.
#[derive(Clone)]
pub struct TrikStorage {
    backend: Arc<dyn StorageBackend>,
    trik_id: String,
    max_size_bytes: u64,
}

impl TrikStorage {
    pub fn new(backend: Arc<dyn StorageBackend>, trik_id: impl Into<String>) -> Self {
        Self {
            backend,
            trik_id: trik_id.into(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }

    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn trik_id(&self) -> &str {
        &self.trik_id
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.backend.get(&self.trik_id, key)
    }

    pub fn set(&self, key: &str, value: &Value, ttl_ms: Option<u64>) -> Result<(), StorageError> {
        self.backend
            .set(&self.trik_id, key, value, ttl_ms, self.max_size_bytes)
    }

    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.trik_id, key)
    }

    pub fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.backend.list(&self.trik_id, prefix)
    }

    /// Fetch several keys at once; missing keys are omitted from the result.
    pub fn get_many(&self, keys: &[String]) -> Result<BTreeMap<String, Value>, StorageError> {
        let mut values = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                values.insert(key.clone(), value);
            }
        }
        Ok(values)
    }

    pub fn set_many(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value, None)?;
        }
        Ok(())
    }

    pub fn usage(&self) -> Result<u64, StorageError> {
        self.backend.usage(&self.trik_id)
    }
}
