//! In-process execution for host-runtime triks.
//!
//! A native trik is a [`TrikGraph`] implementation registered against its
//! trik id; dispatch calls it directly with the same storage, config, and
//! session contexts a worker would receive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use trikhub_core::skill::{SkillInput, SkillOutput};
use trikhub_store::TrikStorage;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{0}")]
    Execution(String),
}

/// The single entry point every trik implements.
#[async_trait]
pub trait TrikGraph: Send + Sync {
    async fn invoke(
        &self,
        input: SkillInput,
        storage: Option<TrikStorage>,
    ) -> Result<SkillOutput, GraphError>;
}

/// Registry of native graphs keyed by trik id.
#[derive(Default)]
pub struct NativeRegistry {
    graphs: RwLock<HashMap<String, Arc<dyn TrikGraph>>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trik_id: impl Into<String>, graph: Arc<dyn TrikGraph>) {
        self.graphs.write().insert(trik_id.into(), graph);
    }

    pub fn get(&self, trik_id: &str) -> Option<Arc<dyn TrikGraph>> {
        self.graphs.read().get(trik_id).map(Arc::clone)
    }

    pub fn unregister(&self, trik_id: &str) -> bool {
        self.graphs.write().remove(trik_id).is_some()
    }

    pub fn contains(&self, trik_id: &str) -> bool {
        self.graphs.read().contains_key(trik_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoGraph;

    #[async_trait]
    impl TrikGraph for EchoGraph {
        async fn invoke(
            &self,
            input: SkillInput,
            _storage: Option<TrikStorage>,
        ) -> Result<SkillOutput, GraphError> {
            Ok(SkillOutput {
                agent_data: Some(json!({"echo": input.action})),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn register_and_invoke() {
        let registry = NativeRegistry::new();
        registry.register("@demo/echo", Arc::new(EchoGraph));
        assert!(registry.contains("@demo/echo"));

        let graph = registry.get("@demo/echo").unwrap();
        let output = graph
            .invoke(
                SkillInput {
                    action: "ping".into(),
                    input: json!({}),
                    session: None,
                    config: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(output.agent_data.unwrap()["echo"], "ping");
    }

    #[test]
    fn unregister() {
        let registry = NativeRegistry::new();
        registry.register("@demo/echo", Arc::new(EchoGraph));
        assert!(registry.unregister("@demo/echo"));
        assert!(!registry.unregister("@demo/echo"));
        assert!(registry.get("@demo/echo").is_none());
    }
}
