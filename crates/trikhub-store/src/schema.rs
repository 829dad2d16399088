//! SQLite schema for the storage backend.

pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

pub const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS storage_entries (
        trik_id TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        size INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER,
        PRIMARY KEY (trik_id, key)
    );

    CREATE INDEX IF NOT EXISTS idx_storage_expires
        ON storage_entries(expires_at) WHERE expires_at IS NOT NULL;
";
