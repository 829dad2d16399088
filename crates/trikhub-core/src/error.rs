use serde::{Deserialize, Serialize};

/// Gateway error codes, shared between the caller-facing API and the worker
/// wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // JSON-RPC standard
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    // Gateway-specific
    TrikNotFound,
    ActionNotFound,
    ExecutionTimeout,
    SchemaValidationFailed,
    WorkerNotReady,
    StorageError,
}

impl ErrorCode {
    /// Numeric code used on the JSON-RPC worker channel.
    pub fn rpc_code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::TrikNotFound => 1001,
            Self::ActionNotFound => 1002,
            Self::ExecutionTimeout => 1003,
            Self::SchemaValidationFailed => 1004,
            Self::WorkerNotReady => 1005,
            Self::StorageError => 1006,
        }
    }

    /// Map a numeric JSON-RPC code back to an error code.
    /// Unknown codes collapse to `InternalError`.
    pub fn from_rpc_code(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            1001 => Self::TrikNotFound,
            1002 => Self::ActionNotFound,
            1003 => Self::ExecutionTimeout,
            1004 => Self::SchemaValidationFailed,
            1005 => Self::WorkerNotReady,
            1006 => Self::StorageError,
            _ => Self::InternalError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::TrikNotFound => "TRIK_NOT_FOUND",
            Self::ActionNotFound => "ACTION_NOT_FOUND",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            Self::WorkerNotReady => "WORKER_NOT_READY",
            Self::StorageError => "STORAGE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed gateway error. Never thrown across the API boundary; always
/// carried inside a `GatewayResult::Error`.
#[derive(Clone, Debug, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn trik_not_found(trik_id: &str) -> Self {
        Self::new(
            ErrorCode::TrikNotFound,
            format!("trik \"{trik_id}\" is not loaded"),
        )
    }

    pub fn action_not_found(action: &str, available: &str) -> Self {
        Self::new(
            ErrorCode::ActionNotFound,
            format!("action \"{action}\" not found; available: {available}"),
        )
    }

    pub fn timeout(ms: u64) -> Self {
        Self::new(
            ErrorCode::ExecutionTimeout,
            format!("execution timed out after {ms}ms"),
        )
    }
}
