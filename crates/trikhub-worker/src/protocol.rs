//! JSON-RPC 2.0 message framing for the worker channel.
//!
//! One message per line. Every message carries `jsonrpc: "2.0"` and a string
//! id; requests carry `method` (+ optional `params`), responses carry exactly
//! one of `result` or `error`. Anything else is a parse error, reported but
//! never fatal to the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trikhub_core::ids::RequestId;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request with a fresh UUID id.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::new().to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Request(RpcRequest),
    Response(RpcResponse),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    Json(String),
    #[error("message must be a JSON object")]
    NotAnObject,
    #[error("message must carry jsonrpc \"2.0\"")]
    BadVersion,
    #[error("message id must be a string")]
    BadId,
    #[error("response must carry exactly one of result or error")]
    AmbiguousResponse,
    #[error("message is neither a request nor a response")]
    UnknownShape,
}

/// Parse one newline-delimited message.
pub fn parse_line(line: &str) -> Result<Message, ProtocolError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::Json(e.to_string()))?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(ProtocolError::BadVersion);
    }
    if !object.get("id").map(Value::is_string).unwrap_or(false) {
        return Err(ProtocolError::BadId);
    }

    if object.contains_key("method") {
        let request: RpcRequest =
            serde_json::from_value(value).map_err(|e| ProtocolError::Json(e.to_string()))?;
        return Ok(Message::Request(request));
    }

    let has_result = object.contains_key("result");
    let has_error = object.contains_key("error");
    match (has_result, has_error) {
        (true, false) | (false, true) => {
            let response: RpcResponse =
                serde_json::from_value(value).map_err(|e| ProtocolError::Json(e.to_string()))?;
            Ok(Message::Response(response))
        }
        (true, true) => Err(ProtocolError::AmbiguousResponse),
        (false, false) => Err(ProtocolError::UnknownShape),
    }
}

/// Serialize a message to its single-line wire form (no trailing newline).
pub fn to_line<T: Serialize>(message: &T) -> String {
    // The message types serialize infallibly (no non-string map keys).
    serde_json::to_string(message).unwrap_or_default()
}
