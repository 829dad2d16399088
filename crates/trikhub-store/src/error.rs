#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("value is not JSON-serialisable: {0}")]
    Serialization(String),

    #[error("storage quota exceeded: usage {used} bytes + {adding} bytes would exceed {max} bytes")]
    QuotaExceeded { used: u64, adding: u64, max: u64 },
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
