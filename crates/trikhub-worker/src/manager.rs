//! One worker per foreign runtime, spawned lazily and shared across triks of
//! that runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use trikhub_manifest::TrikRuntime;
use trikhub_store::TrikStorage;

use trikhub_core::skill::SkillOutput;

use crate::worker::{
    HealthReport, InvokeParams, SubprocessWorker, WorkerCommand, WorkerConfig, WorkerError,
};

/// Default launch commands per runtime. Overridable through
/// [`WorkerManager::with_config`].
fn default_config(runtime: TrikRuntime) -> Option<WorkerConfig> {
    match runtime {
        TrikRuntime::Node => Some(WorkerConfig::new(WorkerCommand::new(
            "npx",
            vec!["@trikhub/worker-js".into()],
        ))),
        TrikRuntime::Python => Some(WorkerConfig::new(WorkerCommand::new(
            "python3",
            vec!["-m".into(), "trikhub.worker".into()],
        ))),
        TrikRuntime::Native => None,
    }
}

/// Owns the subprocess workers. A gateway holds exactly one manager; callers
/// that want to share workers take the gateway by reference.
pub struct WorkerManager {
    configs: Mutex<HashMap<TrikRuntime, WorkerConfig>>,
    workers: Mutex<HashMap<TrikRuntime, Arc<SubprocessWorker>>>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Override the launch configuration for a runtime. Must be called
    /// before the first invocation for that runtime.
    pub fn with_config(self, runtime: TrikRuntime, config: WorkerConfig) -> Self {
        self.configs.lock().insert(runtime, config);
        self
    }

    pub fn set_config(&self, runtime: TrikRuntime, config: WorkerConfig) {
        self.configs.lock().insert(runtime, config);
    }

    fn worker_for(&self, runtime: TrikRuntime) -> Result<Arc<SubprocessWorker>, WorkerError> {
        if let Some(worker) = self.workers.lock().get(&runtime) {
            return Ok(Arc::clone(worker));
        }

        let config = self
            .configs
            .lock()
            .get(&runtime)
            .cloned()
            .or_else(|| default_config(runtime))
            .ok_or_else(|| {
                WorkerError::Spawn(format!("no worker configured for runtime {runtime}"))
            })?;

        let worker = Arc::new(SubprocessWorker::new(config));
        let mut workers = self.workers.lock();
        Ok(Arc::clone(workers.entry(runtime).or_insert(worker)))
    }

    /// Dispatch an invocation to the runtime's worker, spawning it first if
    /// needed.
    pub async fn invoke(
        &self,
        runtime: TrikRuntime,
        params: InvokeParams,
        storage: Option<TrikStorage>,
        timeout: Option<Duration>,
    ) -> Result<SkillOutput, WorkerError> {
        let worker = self.worker_for(runtime)?;
        worker.invoke(params, storage, timeout).await
    }

    pub async fn health(&self, runtime: TrikRuntime) -> Result<HealthReport, WorkerError> {
        let worker = self.worker_for(runtime)?;
        worker.health().await
    }

    /// Count of live worker processes (for tests and diagnostics).
    pub async fn live_workers(&self) -> usize {
        let workers: Vec<Arc<SubprocessWorker>> =
            self.workers.lock().values().cloned().collect();
        let mut live = 0;
        for worker in workers {
            if worker.is_ready().await {
                live += 1;
            }
        }
        live
    }

    /// Shut every worker down, best-effort.
    pub async fn shutdown_all(&self) {
        let workers: Vec<Arc<SubprocessWorker>> =
            self.workers.lock().drain().map(|(_, w)| w).collect();
        for worker in workers {
            worker.shutdown().await;
        }
    }
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_runtime_has_no_worker() {
        let manager = WorkerManager::new();
        assert!(manager.worker_for(TrikRuntime::Native).is_err());
    }

    #[test]
    fn worker_is_shared_per_runtime() {
        let manager = WorkerManager::new().with_config(
            TrikRuntime::Python,
            WorkerConfig::new(WorkerCommand::new("python3", vec![])),
        );
        let a = manager.worker_for(TrikRuntime::Python).unwrap();
        let b = manager.worker_for(TrikRuntime::Python).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn no_live_workers_before_first_invoke() {
        let manager = WorkerManager::new().with_config(
            TrikRuntime::Python,
            WorkerConfig::new(WorkerCommand::new("python3", vec![])),
        );
        let _ = manager.worker_for(TrikRuntime::Python).unwrap();
        assert_eq!(manager.live_workers().await, 0);
    }
}
