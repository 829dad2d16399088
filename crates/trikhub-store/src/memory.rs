//! Ephemeral storage backend. Semantically identical to the SQLite backend
//! but lost on shutdown; used by tests and CI.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{encoded_size, StorageBackend};
use crate::error::StorageError;
use crate::now_ms;

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    size: u64,
    expires_at: Option<i64>,
}

impl Entry {
    fn live(&self, now: i64) -> bool {
        self.expires_at.map(|expiry| expiry > now).unwrap_or(true)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(entries: &mut HashMap<(String, String), Entry>, now: i64) {
        entries.retain(|_, entry| entry.live(now));
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, trik_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let now = now_ms();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        Ok(entries
            .get(&(trik_id.to_string(), key.to_string()))
            .map(|entry| entry.value.clone()))
    }

    fn set(
        &self,
        trik_id: &str,
        key: &str,
        value: &Value,
        ttl_ms: Option<u64>,
        max_size_bytes: u64,
    ) -> Result<(), StorageError> {
        let now = now_ms();
        let new_size = encoded_size(value)?;
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);

        let usage: u64 = entries
            .iter()
            .filter(|((owner, _), _)| owner == trik_id)
            .map(|(_, entry)| entry.size)
            .sum();
        let old_size = entries
            .get(&(trik_id.to_string(), key.to_string()))
            .map(|entry| entry.size)
            .unwrap_or(0);

        if usage - old_size + new_size > max_size_bytes {
            return Err(StorageError::QuotaExceeded {
                used: usage - old_size,
                adding: new_size,
                max: max_size_bytes,
            });
        }

        let expires_at = ttl_ms.filter(|ttl| *ttl > 0).map(|ttl| now + ttl as i64);
        entries.insert(
            (trik_id.to_string(), key.to_string()),
            Entry { value: value.clone(), size: new_size, expires_at },
        );
        Ok(())
    }

    fn delete(&self, trik_id: &str, key: &str) -> Result<bool, StorageError> {
        let now = now_ms();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        Ok(entries
            .remove(&(trik_id.to_string(), key.to_string()))
            .is_some())
    }

    fn list(&self, trik_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let now = now_ms();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|(owner, key)| {
                owner == trik_id && prefix.map(|p| key.starts_with(p)).unwrap_or(true)
            })
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn usage(&self, trik_id: &str) -> Result<u64, StorageError> {
        let now = now_ms();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|((owner, _), entry)| owner == trik_id && entry.live(now))
            .map(|(_, entry)| entry.size)
            .sum())
    }

    fn clear(&self, trik_id: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.retain(|(owner, _), _| owner != trik_id);
        Ok(())
    }

    fn list_triks(&self) -> Result<Vec<String>, StorageError> {
        let now = now_ms();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        let mut triks: Vec<String> = entries.keys().map(|(owner, _)| owner.clone()).collect();
        triks.sort();
        triks.dedup();
        Ok(triks)
    }
}
