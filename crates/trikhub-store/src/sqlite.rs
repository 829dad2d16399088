//! Durable storage backend on SQLite.
//!
//! Rows are keyed `(trik_id, key)` with an expiry index. Expired entries are
//! swept best-effort at the start of each operation and are invisible either
//! way (every query filters on expiry).

use serde_json::Value;

use crate::backend::StorageBackend;
use crate::database::Database;
use crate::error::StorageError;
use crate::now_ms;

pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Best-effort sweep of expired rows.
    fn sweep(&self) {
        let _ = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM storage_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [now_ms()],
            )?;
            Ok(())
        });
    }
}

/// Escape LIKE wildcards so prefixes are matched literally.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl StorageBackend for SqliteStorage {
    fn get(&self, trik_id: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.sweep();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT value FROM storage_entries
                 WHERE trik_id = ?1 AND key = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
            )?;
            let mut rows = stmt.query(rusqlite::params![trik_id, key, now_ms()])?;
            match rows.next()? {
                Some(row) => {
                    let text: String = row.get(0)?;
                    Ok(Some(serde_json::from_str(&text)?))
                }
                None => Ok(None),
            }
        })
    }

    fn set(
        &self,
        trik_id: &str,
        key: &str,
        value: &Value,
        ttl_ms: Option<u64>,
        max_size_bytes: u64,
    ) -> Result<(), StorageError> {
        self.sweep();
        let encoded = serde_json::to_string(value)?;
        let new_size = encoded.len() as u64;
        let now = now_ms();
        let expires_at = ttl_ms.filter(|ttl| *ttl > 0).map(|ttl| now + ttl as i64);

        self.db.with_conn(|conn| {
            // Quota check and write under one connection lock so concurrent
            // writers cannot overshoot the cap.
            let usage: u64 = conn.query_row(
                "SELECT COALESCE(SUM(size), 0) FROM storage_entries
                 WHERE trik_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![trik_id, now],
                |row| row.get::<_, i64>(0).map(|n| n as u64),
            )?;
            let old_size: u64 = conn
                .query_row(
                    "SELECT size FROM storage_entries
                     WHERE trik_id = ?1 AND key = ?2
                       AND (expires_at IS NULL OR expires_at > ?3)",
                    rusqlite::params![trik_id, key, now],
                    |row| row.get::<_, i64>(0).map(|n| n as u64),
                )
                .unwrap_or(0);

            if usage - old_size + new_size > max_size_bytes {
                return Err(StorageError::QuotaExceeded {
                    used: usage - old_size,
                    adding: new_size,
                    max: max_size_bytes,
                });
            }

            conn.execute(
                "INSERT INTO storage_entries (trik_id, key, value, size, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (trik_id, key) DO UPDATE SET
                     value = excluded.value,
                     size = excluded.size,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at",
                rusqlite::params![trik_id, key, encoded, new_size as i64, now, expires_at],
            )?;
            Ok(())
        })
    }

    fn delete(&self, trik_id: &str, key: &str) -> Result<bool, StorageError> {
        self.sweep();
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM storage_entries WHERE trik_id = ?1 AND key = ?2",
                rusqlite::params![trik_id, key],
            )?;
            Ok(deleted > 0)
        })
    }

    fn list(&self, trik_id: &str, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        self.sweep();
        self.db.with_conn(|conn| {
            let keys = match prefix {
                Some(prefix) => {
                    let pattern = format!("{}%", escape_like(prefix));
                    let mut stmt = conn.prepare(
                        "SELECT key FROM storage_entries
                         WHERE trik_id = ?1 AND key LIKE ?2 ESCAPE '\\'
                           AND (expires_at IS NULL OR expires_at > ?3)
                         ORDER BY key",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![trik_id, pattern, now_ms()], |row| {
                            row.get(0)
                        })?
                        .collect::<Result<Vec<String>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT key FROM storage_entries
                         WHERE trik_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                         ORDER BY key",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![trik_id, now_ms()], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?;
                    rows
                }
            };
            Ok(keys)
        })
    }

    fn usage(&self, trik_id: &str) -> Result<u64, StorageError> {
        self.db.with_conn(|conn| {
            let usage: i64 = conn.query_row(
                "SELECT COALESCE(SUM(size), 0) FROM storage_entries
                 WHERE trik_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![trik_id, now_ms()],
                |row| row.get(0),
            )?;
            Ok(usage as u64)
        })
    }

    fn clear(&self, trik_id: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM storage_entries WHERE trik_id = ?1", [trik_id])?;
            Ok(())
        })
    }

    fn list_triks(&self) -> Result<Vec<String>, StorageError> {
        self.sweep();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT trik_id FROM storage_entries
                 WHERE expires_at IS NULL OR expires_at > ?1
                 ORDER BY trik_id",
            )?;
            let rows = stmt
                .query_map([now_ms()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }
}
