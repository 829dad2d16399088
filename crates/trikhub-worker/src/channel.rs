//! The duplex worker channel.
//!
//! A read loop demultiplexes inbound lines: responses complete pending
//! requests by id, inbound requests (the worker's `storage.*` calls) are
//! served against the storage handle attached to the in-flight invocation.
//! Malformed lines are logged and dropped; the channel stays open. When the
//! peer goes away, every pending request resolves with a closed-channel
//! error — nothing leaks.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use trikhub_core::error::ErrorCode;
use trikhub_store::TrikStorage;

use crate::protocol::{self, Message, RpcRequest, RpcResponse};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("worker channel closed")]
    Closed,
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("failed to write to worker: {0}")]
    Write(String),
}

type PendingSender = oneshot::Sender<Result<RpcResponse, ChannelError>>;

struct ChannelInner {
    writer: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending: parking_lot::Mutex<HashMap<String, PendingSender>>,
    storage: parking_lot::Mutex<Option<TrikStorage>>,
}

impl ChannelInner {
    async fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::Closed)?;
        let framed = format!("{line}\n");
        writer
            .write_all(framed.as_bytes())
            .await
            .map_err(|e| ChannelError::Write(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ChannelError::Write(e.to_string()))?;
        Ok(())
    }

    fn fail_all_pending(&self) {
        let mut pending = self.pending.lock();
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(ChannelError::Closed));
        }
    }
}

/// One live JSON-RPC channel to a worker, generic over its byte streams so
/// the correlation machinery is testable over in-memory pipes.
pub struct WorkerChannel {
    inner: Arc<ChannelInner>,
    read_task: JoinHandle<()>,
}

impl WorkerChannel {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let inner = Arc::new(ChannelInner {
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            pending: parking_lot::Mutex::new(HashMap::new()),
            storage: parking_lot::Mutex::new(None),
        });

        let read_task = tokio::spawn(read_loop(Arc::clone(&inner), reader));

        Self { inner, read_task }
    }

    /// Attach (or detach) the storage handle served to inbound `storage.*`
    /// requests for the duration of an invocation.
    pub fn set_storage(&self, storage: Option<TrikStorage>) {
        *self.inner.storage.lock() = storage;
    }

    /// Send a request and await its correlated response.
    ///
    /// On timeout the pending entry is removed, so a late response is
    /// consumed and dropped by the read loop without disturbing the channel.
    pub async fn request(
        &self,
        request: RpcRequest,
        timeout: std::time::Duration,
    ) -> Result<RpcResponse, ChannelError> {
        let (sender, receiver) = oneshot::channel();
        let id = request.id.clone();
        self.inner.pending.lock().insert(id.clone(), sender);

        if let Err(e) = self.inner.write_line(&protocol::to_line(&request)).await {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the channel died mid-request.
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.inner.pending.lock().remove(&id);
                Err(ChannelError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.read_task.is_finished()
    }

    /// Tear the channel down, failing anything still pending.
    pub async fn close(&self) {
        self.read_task.abort();
        *self.inner.writer.lock().await = None;
        self.inner.fail_all_pending();
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.read_task.abort();
        self.inner.fail_all_pending();
    }
}

async fn read_loop(inner: Arc<ChannelInner>, reader: impl AsyncRead + Send + Unpin + 'static) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_line(&inner, line).await;
            }
            Ok(None) => break, // EOF
            Err(e) => {
                warn!(error = %e, "worker channel read error");
                break;
            }
        }
    }
    inner.fail_all_pending();
}

async fn handle_line(inner: &Arc<ChannelInner>, line: &str) {
    match protocol::parse_line(line) {
        Ok(Message::Response(response)) => {
            let sender = inner.pending.lock().remove(&response.id);
            match sender {
                Some(sender) => {
                    let _ = sender.send(Ok(response));
                }
                None => {
                    debug!(id = %response.id, "response matches no pending request, dropping");
                }
            }
        }
        Ok(Message::Request(request)) => {
            let response = handle_inbound_request(inner, &request);
            if let Err(e) = inner.write_line(&protocol::to_line(&response)).await {
                warn!(error = %e, "failed to answer worker request");
            }
        }
        Err(e) => {
            // Parse errors are diagnostics, not channel failures.
            warn!(error = %e, line, "dropping malformed worker message");
        }
    }
}

/// Serve a worker-originated request. Only `storage.*` is recognised.
fn handle_inbound_request(inner: &ChannelInner, request: &RpcRequest) -> RpcResponse {
    let Some(method) = request.method.strip_prefix("storage.") else {
        return RpcResponse::error(
            request.id.clone(),
            ErrorCode::MethodNotFound.rpc_code(),
            format!("unknown method: {}", request.method),
        );
    };

    let storage = inner.storage.lock();
    let Some(storage) = storage.as_ref() else {
        return RpcResponse::error(
            request.id.clone(),
            ErrorCode::StorageError.rpc_code(),
            "storage is not available for this invocation",
        );
    };

    let params = request.params.clone().unwrap_or_else(|| json!({}));
    match serve_storage(storage, method, &params) {
        Ok(result) => RpcResponse::success(request.id.clone(), result),
        Err(StorageServeError::UnknownMethod) => RpcResponse::error(
            request.id.clone(),
            ErrorCode::MethodNotFound.rpc_code(),
            format!("unknown storage method: storage.{method}"),
        ),
        Err(StorageServeError::BadParams(message)) => RpcResponse::error(
            request.id.clone(),
            ErrorCode::InvalidParams.rpc_code(),
            message,
        ),
        Err(StorageServeError::Storage(message)) => RpcResponse::error(
            request.id.clone(),
            ErrorCode::StorageError.rpc_code(),
            message,
        ),
    }
}

#[derive(Debug)]
enum StorageServeError {
    UnknownMethod,
    BadParams(String),
    Storage(String),
}

impl From<trikhub_store::StorageError> for StorageServeError {
    fn from(e: trikhub_store::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

fn require_key(params: &Value) -> Result<&str, StorageServeError> {
    params
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| StorageServeError::BadParams("missing required parameter: key".into()))
}

fn serve_storage(
    storage: &TrikStorage,
    method: &str,
    params: &Value,
) -> Result<Value, StorageServeError> {
    match method {
        "get" => {
            let key = require_key(params)?;
            let value = storage.get(key)?;
            Ok(json!({ "value": value }))
        }
        "set" => {
            let key = require_key(params)?;
            let value = params.get("value").cloned().ok_or_else(|| {
                StorageServeError::BadParams("missing required parameter: value".into())
            })?;
            let ttl = params.get("ttl").and_then(Value::as_u64);
            storage.set(key, &value, ttl)?;
            Ok(json!({ "success": true }))
        }
        "delete" => {
            let key = require_key(params)?;
            let deleted = storage.delete(key)?;
            Ok(json!({ "deleted": deleted }))
        }
        "list" => {
            let prefix = params.get("prefix").and_then(Value::as_str);
            let keys = storage.list(prefix)?;
            Ok(json!({ "keys": keys }))
        }
        "getMany" => {
            let keys: Vec<String> = params
                .get("keys")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| StorageServeError::BadParams(format!("keys: {e}")))?
                .ok_or_else(|| {
                    StorageServeError::BadParams("missing required parameter: keys".into())
                })?;
            let values = storage.get_many(&keys)?;
            Ok(json!({ "values": values }))
        }
        "setMany" => {
            let entries: std::collections::BTreeMap<String, Value> = params
                .get("entries")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| StorageServeError::BadParams(format!("entries: {e}")))?
                .ok_or_else(|| {
                    StorageServeError::BadParams("missing required parameter: entries".into())
                })?;
            storage.set_many(&entries)?;
            Ok(json!({ "success": true }))
        }
        _ => Err(StorageServeError::UnknownMethod),
    }
}
