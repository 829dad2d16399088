//! Per-trik persistent storage.
//!
//! The gateway hands each skill a [`TrikStorage`] handle scoped to its own
//! namespace; cross-trik isolation is enforced by construction. Two backends
//! share the same semantics: [`SqliteStorage`] is durable across restarts,
//! [`MemoryStorage`] is ephemeral (tests and CI).

pub mod backend;
pub mod database;
pub mod error;
pub mod handle;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use backend::StorageBackend;
pub use database::Database;
pub use error::StorageError;
pub use handle::TrikStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Default per-trik quota: 100 MiB of JSON-encoded values.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
