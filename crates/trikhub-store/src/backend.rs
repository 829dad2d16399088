use serde_json::Value;

use crate::error::StorageError;

/// Namespaced key-value backend shared across triks.
///
/// Every operation takes the owning trik id; cross-trik isolation reduces to
/// key-space discipline on the `(trik_id, key)` primary key. Skill code never
/// sees this trait — it gets a [`crate::TrikStorage`] handle bound to one id.
pub trait StorageBackend: Send + Sync {
    fn get(&self, trik_id: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace a value. `ttl_ms` is relative; the entry records an
    /// absolute expiry. Fails with `QuotaExceeded` when
    /// `usage - old_size + new_size > max_size_bytes`.
    fn set(
        &self,
        trik_id: &str,
        key: &str,
        value: &Value,
        ttl_ms: Option<u64>,
        max_size_bytes: u64,
    ) -> Result<(), StorageError>;

    /// Returns true when the key existed.
    fn delete(&self, trik_id: &str, key: &str) -> Result<bool, StorageError>;

    /// Keys whose text begins with `prefix` (all keys when absent). Wildcard
    /// characters in the prefix are literals.
    fn list(&self, trik_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// Total JSON-encoded size of live entries for a trik, in bytes.
    fn usage(&self, trik_id: &str) -> Result<u64, StorageError>;

    /// Remove every entry for a trik.
    fn clear(&self, trik_id: &str) -> Result<(), StorageError>;

    /// Trik ids with at least one live entry.
    fn list_triks(&self) -> Result<Vec<String>, StorageError>;
}

/// UTF-8 size of the JSON encoding, the unit all quotas are measured in.
pub fn encoded_size(value: &Value) -> Result<u64, StorageError> {
    Ok(serde_json::to_string(value)?.len() as u64)
}
