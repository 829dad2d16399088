//! Subprocess worker lifecycle.
//!
//! One long-running process per foreign runtime, spoken to over stdio.
//! Spawn is lazy, gated by a `health()` round-trip under a startup deadline.
//! Invocations are serialized: the channel is a single mutator, and inbound
//! storage calls are handled between outbound messages. On process exit the
//! channel fails everything pending and the next invoke respawns.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trikhub_core::skill::{SessionContext, SkillOutput};
use trikhub_store::TrikStorage;

use crate::channel::{ChannelError, WorkerChannel};
use crate::protocol::RpcRequest;

/// How to launch a worker binary.
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub command: WorkerCommand,
    pub startup_timeout: Duration,
    pub invoke_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl WorkerConfig {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            startup_timeout: Duration::from_secs(10),
            invoke_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uptime: Option<f64>,
}

/// Parameters of an `invoke` request, in wire shape.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeParams {
    pub trik_path: String,
    pub action: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("worker startup timed out after {0}ms")]
    StartupTimeout(u64),
    #[error("worker health check failed: {0}")]
    Health(String),
    #[error("worker invocation timed out after {0}ms")]
    Timeout(u64),
    #[error("worker channel terminated")]
    ChannelClosed,
    #[error("worker rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("worker returned a malformed result: {0}")]
    BadResult(String),
}

impl From<ChannelError> for WorkerError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Closed | ChannelError::Write(_) => Self::ChannelClosed,
            ChannelError::Timeout(ms) => Self::Timeout(ms),
        }
    }
}

struct Running {
    child: Child,
    channel: WorkerChannel,
    stderr_task: Option<JoinHandle<()>>,
}

impl Running {
    async fn teardown(mut self) {
        self.channel.close().await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// A single worker subprocess. All lifecycle and invocation paths run under
/// one async lock, which is what serializes requests over stdio.
pub struct SubprocessWorker {
    config: WorkerConfig,
    state: tokio::sync::Mutex<Option<Running>>,
}

impl SubprocessWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            state: tokio::sync::Mutex::new(None),
            config,
        }
    }

    /// Spawn the process and gate readiness on a health round-trip.
    async fn spawn(&self) -> Result<Running, WorkerError> {
        let command = &self.config.command;
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        // Stderr is diagnostic only: surfaced to the host logger, never parsed.
        let stderr_task = stderr.map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "trikhub_worker::stderr", "{line}");
                }
            })
        });

        let channel = WorkerChannel::new(stdout, stdin);
        let running = Running { child, channel, stderr_task };

        let health = running
            .channel
            .request(RpcRequest::new("health", None), self.config.startup_timeout)
            .await;

        match health {
            Ok(response) if !response.is_error() => {
                let report: HealthReport =
                    serde_json::from_value(response.result.unwrap_or_default())
                        .map_err(|e| WorkerError::Health(e.to_string()))?;
                if report.status != "ok" {
                    running.teardown().await;
                    return Err(WorkerError::Health(format!(
                        "worker reported status {}",
                        report.status
                    )));
                }
                info!(
                    program = %self.config.command.program,
                    runtime = report.runtime.as_deref().unwrap_or("unknown"),
                    "worker ready"
                );
                Ok(running)
            }
            Ok(response) => {
                let message = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown error".into());
                running.teardown().await;
                Err(WorkerError::Health(message))
            }
            Err(ChannelError::Timeout(ms)) => {
                running.teardown().await;
                Err(WorkerError::StartupTimeout(ms))
            }
            Err(e) => {
                running.teardown().await;
                Err(e.into())
            }
        }
    }

    async fn ensure_running<'a>(
        &self,
        state: &'a mut Option<Running>,
    ) -> Result<&'a mut Running, WorkerError> {
        let dead = state
            .as_ref()
            .map(|running| running.channel.is_closed())
            .unwrap_or(true);
        if dead {
            if let Some(old) = state.take() {
                warn!("worker channel dead, respawning");
                old.teardown().await;
            }
            *state = Some(self.spawn().await?);
        }
        match state.as_mut() {
            Some(running) => Ok(running),
            None => Err(WorkerError::Spawn("worker state lost".into())),
        }
    }

    /// Run one action on the worker. The storage handle, when present, backs
    /// inbound `storage.*` calls for the duration of this invocation.
    pub async fn invoke(
        &self,
        params: InvokeParams,
        storage: Option<TrikStorage>,
        timeout: Option<Duration>,
    ) -> Result<SkillOutput, WorkerError> {
        let mut state = self.state.lock().await;
        let running = self.ensure_running(&mut state).await?;

        let request = RpcRequest::new(
            "invoke",
            Some(serde_json::to_value(&params).map_err(|e| WorkerError::BadResult(e.to_string()))?),
        );
        let timeout = timeout.unwrap_or(self.config.invoke_timeout);
        running.channel.set_storage(storage);
        let outcome = running.channel.request(request, timeout).await;
        running.channel.set_storage(None);

        let response = match outcome {
            Ok(response) => response,
            Err(ChannelError::Closed | ChannelError::Write(_)) => {
                // The process died mid-invoke. Drop it so the next call
                // respawns.
                if let Some(old) = state.take() {
                    old.teardown().await;
                }
                return Err(WorkerError::ChannelClosed);
            }
            Err(ChannelError::Timeout(ms)) => return Err(WorkerError::Timeout(ms)),
        };

        if let Some(error) = response.error {
            return Err(WorkerError::Rpc { code: error.code, message: error.message });
        }

        serde_json::from_value(response.result.unwrap_or_default())
            .map_err(|e| WorkerError::BadResult(e.to_string()))
    }

    /// Health check, spawning the worker if needed.
    pub async fn health(&self) -> Result<HealthReport, WorkerError> {
        let mut state = self.state.lock().await;
        let running = self.ensure_running(&mut state).await?;
        let response = running
            .channel
            .request(RpcRequest::new("health", None), self.config.startup_timeout)
            .await?;
        if let Some(error) = response.error {
            return Err(WorkerError::Rpc { code: error.code, message: error.message });
        }
        serde_json::from_value(response.result.unwrap_or_default())
            .map_err(|e| WorkerError::BadResult(e.to_string()))
    }

    /// Whether a live, ready process is attached.
    pub async fn is_ready(&self) -> bool {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|running| !running.channel.is_closed())
            .unwrap_or(false)
    }

    /// Best-effort graceful shutdown: `shutdown` RPC, then kill after the
    /// grace period.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let Some(running) = state.take() else {
            return;
        };
        let grace_ms = self.config.shutdown_grace.as_millis() as u64;
        let request = RpcRequest::new(
            "shutdown",
            Some(serde_json::json!({ "gracePeriodMs": grace_ms })),
        );
        let _ = running
            .channel
            .request(request, self.config.shutdown_grace)
            .await;
        running.teardown().await;
        info!(program = %self.config.command.program, "worker shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_params_wire_shape() {
        let params = InvokeParams {
            trik_path: "/triks/@demo/articles".into(),
            action: "search".into(),
            input: serde_json::json!({"q": "rust"}),
            session: None,
            config: None,
        };
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(v["trikPath"], "/triks/@demo/articles");
        assert_eq!(v["action"], "search");
        assert!(v.get("session").is_none());
        assert!(v.get("config").is_none());
    }

    #[test]
    fn channel_error_mapping() {
        assert!(matches!(
            WorkerError::from(ChannelError::Closed),
            WorkerError::ChannelClosed
        ));
        assert!(matches!(
            WorkerError::from(ChannelError::Timeout(10)),
            WorkerError::Timeout(10)
        ));
        assert!(matches!(
            WorkerError::from(ChannelError::Write("broken pipe".into())),
            WorkerError::ChannelClosed
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let worker = SubprocessWorker::new(WorkerConfig::new(WorkerCommand::new(
            "/nonexistent/worker-binary",
            vec![],
        )));
        let err = worker
            .invoke(
                InvokeParams {
                    trik_path: "/t".into(),
                    action: "a".into(),
                    input: serde_json::json!({}),
                    session: None,
                    config: None,
                },
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Spawn(_)));
        assert!(!worker.is_ready().await);
    }
}
