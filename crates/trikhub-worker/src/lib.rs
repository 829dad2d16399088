//! Cross-runtime trik execution.
//!
//! The gateway talks JSON-RPC 2.0 over a worker subprocess's stdio, one
//! message per line. Requests flow both ways: the gateway invokes actions,
//! and during an outstanding invoke the worker may call back into per-trik
//! storage. The channel keeps a pending-request table keyed by id so
//! responses can arrive in any order, and fails every outstanding request
//! when the process goes away.

pub mod channel;
pub mod manager;
pub mod protocol;
pub mod worker;

pub use channel::{ChannelError, WorkerChannel};
pub use manager::WorkerManager;
pub use protocol::{Message, ProtocolError, RpcErrorObject, RpcRequest, RpcResponse};
pub use worker::{HealthReport, InvokeParams, SubprocessWorker, WorkerCommand, WorkerConfig, WorkerError};
