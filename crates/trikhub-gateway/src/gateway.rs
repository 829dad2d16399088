//! The gateway: manifest loading, the tool table, and the per-invocation
//! state machine (validate input → resolve session → dispatch → validate
//! output → render or mint a receipt).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use trikhub_config::ConfigStore;
use trikhub_core::error::ErrorCode;
use trikhub_core::ids::{ContentRef, SessionId};
use trikhub_core::result::GatewayResult;
use trikhub_core::skill::{ResponseMode, SkillInput, SkillOutput};
use trikhub_manifest::{
    load_manifest_dir, ManifestError, TrikManifest, TrikRuntime,
};
use trikhub_store::{MemoryStorage, StorageBackend, StorageError, TrikStorage};
use trikhub_worker::{InvokeParams, WorkerError, WorkerManager};

use crate::content::{ContentInfo, ContentStore, DeliveredContent, DEFAULT_CONTENT_TTL};
use crate::runner::{NativeRegistry, TrikGraph};
use crate::session::SessionStore;
use crate::template;

/// One entry of the computed tool surface.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub response_mode: ResponseMode,
}

/// Summary of a loaded trik.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrikInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub session_enabled: bool,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("a trik with id \"{0}\" is already loaded")]
    Duplicate(String),
    #[error("trik \"{0}\" is not in the allowlist")]
    NotAllowed(String),
    #[error("trik \"{trik_id}\" is missing required config keys: {keys:?}")]
    MissingConfig { trik_id: String, keys: Vec<String> },
    #[error("failed to read config file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

struct LoadedTrik {
    manifest: TrikManifest,
    path: PathBuf,
    runtime: TrikRuntime,
}

pub struct GatewayConfig {
    pub storage: Arc<dyn StorageBackend>,
    pub config_store: ConfigStore,
    pub workers: WorkerManager,
    pub content_ttl: Duration,
    pub allowed_triks: Option<HashSet<String>>,
    /// Refuse to load triks whose required config keys are absent.
    pub validate_config: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            config_store: ConfigStore::empty(),
            workers: WorkerManager::new(),
            content_ttl: DEFAULT_CONTENT_TTL,
            allowed_triks: None,
            validate_config: false,
        }
    }
}

pub struct TrikGateway {
    triks: RwLock<HashMap<String, Arc<LoadedTrik>>>,
    tools: RwLock<HashMap<String, (String, String)>>,
    storage: Arc<dyn StorageBackend>,
    config_store: RwLock<ConfigStore>,
    sessions: SessionStore,
    content: ContentStore,
    natives: NativeRegistry,
    workers: WorkerManager,
    allowed: Option<HashSet<String>>,
    validate_config: bool,
}

impl TrikGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            triks: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
            storage: config.storage,
            config_store: RwLock::new(config.config_store),
            sessions: SessionStore::new(),
            content: ContentStore::new(config.content_ttl),
            natives: NativeRegistry::new(),
            workers: config.workers,
            allowed: config.allowed_triks,
            validate_config: config.validate_config,
        }
    }

    /// Register the graph implementation for a host-runtime trik. Must
    /// happen before the trik's first invocation.
    pub fn register_native(&self, trik_id: impl Into<String>, graph: Arc<dyn TrikGraph>) {
        self.natives.register(trik_id, graph);
    }

    /// Load a trik from a directory: parse and validate its manifest
    /// (structural + security), then register its actions in the tool table.
    /// Loading an already-loaded id is an error.
    pub fn load_trik(&self, trik_dir: &Path) -> Result<TrikManifest, LoadError> {
        let (manifest, location) = load_manifest_dir(trik_dir)?;

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(&manifest.id) {
                return Err(LoadError::NotAllowed(manifest.id));
            }
        }

        if self.validate_config {
            let missing = self.config_store.read().missing_required(&manifest);
            if !missing.is_empty() {
                return Err(LoadError::MissingConfig { trik_id: manifest.id, keys: missing });
            }
        }

        let mut triks = self.triks.write();
        if triks.contains_key(&manifest.id) {
            return Err(LoadError::Duplicate(manifest.id));
        }

        let mut tools = self.tools.write();
        for action_name in manifest.actions.keys() {
            tools.insert(
                format!("{}:{}", manifest.id, action_name),
                (manifest.id.clone(), action_name.clone()),
            );
        }

        let runtime = manifest.runtime();
        triks.insert(
            manifest.id.clone(),
            Arc::new(LoadedTrik {
                manifest: manifest.clone(),
                path: location.manifest_dir,
                runtime,
            }),
        );

        info!(trik_id = %manifest.id, runtime = %runtime, "trik loaded");
        Ok(manifest)
    }

    /// Load every trik under a directory, supporting the scoped
    /// `@scope/name` layout. Failures are logged and skipped.
    pub fn load_triks_from_directory(&self, directory: &Path) -> Vec<TrikManifest> {
        let mut manifests = Vec::new();
        let Ok(entries) = std::fs::read_dir(directory) else {
            return manifests;
        };

        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let is_scope = entry.file_name().to_string_lossy().starts_with('@');
            if is_scope {
                if let Ok(scoped) = std::fs::read_dir(&path) {
                    candidates.extend(
                        scoped
                            .flatten()
                            .map(|scoped_entry| scoped_entry.path())
                            .filter(|scoped_path| scoped_path.is_dir()),
                    );
                }
            } else {
                candidates.push(path);
            }
        }

        for candidate in candidates {
            match self.load_trik(&candidate) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "failed to load trik")
                }
            }
        }
        manifests
    }

    /// Bulk-load the triks named in a registry config file
    /// (`.trikhub/config.json`). Entries resolve as a literal path, then as
    /// `<base_dir>/triks/<name>`.
    pub fn load_triks_from_config(
        &self,
        config_path: &Path,
        base_dir: Option<&Path>,
    ) -> Result<Vec<TrikManifest>, LoadError> {
        if !config_path.exists() {
            info!(path = %config_path.display(), "no registry config file");
            return Ok(Vec::new());
        }

        let registry =
            trikhub_config::RegistryConfig::load(config_path).map_err(|e| LoadError::Config {
                path: config_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let base_dir = base_dir
            .map(Path::to_path_buf)
            .or_else(|| config_path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut manifests = Vec::new();
        for name in &registry.triks {
            let direct = PathBuf::from(name);
            let candidate = if direct.is_dir() {
                direct
            } else {
                base_dir.join("triks").join(name)
            };
            if !candidate.is_dir() {
                warn!(trik = %name, "could not find trik package");
                continue;
            }
            match self.load_trik(&candidate) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!(trik = %name, error = %e, "failed to load trik"),
            }
        }
        info!(count = manifests.len(), "loaded triks from config");
        Ok(manifests)
    }

    pub fn is_loaded(&self, trik_id: &str) -> bool {
        self.triks.read().contains_key(trik_id)
    }

    pub fn loaded_triks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.triks.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn manifest(&self, trik_id: &str) -> Option<TrikManifest> {
        self.triks.read().get(trik_id).map(|t| t.manifest.clone())
    }

    fn tool_definition(manifest: &TrikManifest, action_name: &str) -> Option<ToolDefinition> {
        let action = manifest.actions.get(action_name)?;
        Some(ToolDefinition {
            name: format!("{}:{}", manifest.id, action_name),
            description: action.description.clone().unwrap_or_else(|| {
                format!("Execute {action_name} on {}", manifest.id)
            }),
            input_schema: serde_json::to_value(&action.input_schema).unwrap_or_default(),
            response_mode: action.response_mode,
        })
    }

    /// The computed tool surface across every loaded trik.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        let triks = self.triks.read();
        let mut definitions: Vec<ToolDefinition> = triks
            .values()
            .flat_map(|loaded| {
                loaded
                    .manifest
                    .actions
                    .keys()
                    .filter_map(|action_name| Self::tool_definition(&loaded.manifest, action_name))
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn trik_infos(&self) -> Vec<TrikInfo> {
        let triks = self.triks.read();
        let mut infos: Vec<TrikInfo> = triks
            .values()
            .map(|loaded| TrikInfo {
                id: loaded.manifest.id.clone(),
                name: loaded.manifest.name.clone(),
                description: loaded.manifest.description.clone(),
                session_enabled: loaded.manifest.session_enabled(),
                tools: loaded
                    .manifest
                    .actions
                    .keys()
                    .filter_map(|action_name| Self::tool_definition(&loaded.manifest, action_name))
                    .collect(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Resolve a registered tool name to `(trik_id, action)`.
    pub fn resolve_tool(&self, tool_name: &str) -> Option<(String, String)> {
        self.tools.read().get(tool_name).cloned()
    }

    /// Execute by registered tool name (the HTTP facade's entry point).
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        input: Value,
        session_id: Option<&SessionId>,
    ) -> GatewayResult {
        match self.resolve_tool(tool_name) {
            Some((trik_id, action)) => self.execute(&trik_id, &action, input, session_id).await,
            None => GatewayResult::error(
                ErrorCode::TrikNotFound,
                format!("unknown tool \"{tool_name}\""),
            ),
        }
    }

    /// Execute one action. Never panics and never returns a Rust error:
    /// every failure is a typed `GatewayResult::Error`.
    pub async fn execute(
        &self,
        trik_id: &str,
        action_name: &str,
        input: Value,
        session_id: Option<&SessionId>,
    ) -> GatewayResult {
        let Some(loaded) = self.triks.read().get(trik_id).map(Arc::clone) else {
            return GatewayResult::error(
                ErrorCode::TrikNotFound,
                format!("trik \"{trik_id}\" is not loaded"),
            );
        };
        let manifest = &loaded.manifest;

        let Some(action) = manifest.actions.get(action_name) else {
            let available: Vec<&str> = manifest.actions.keys().map(String::as_str).collect();
            return GatewayResult::error(
                ErrorCode::ActionNotFound,
                format!(
                    "action \"{action_name}\" not found; available: {}",
                    available.join(", ")
                ),
            );
        };

        // VALIDATE_INPUT — before any side effect.
        let violations = action.input_schema.validate(&input);
        if !violations.is_empty() {
            let detail: Vec<String> = violations.iter().map(ToString::to_string).collect();
            return GatewayResult::error(
                ErrorCode::InvalidParams,
                format!("invalid input: {}", detail.join("; ")),
            );
        }

        // RESOLVE_SESSION.
        let session = if manifest.session_enabled() {
            let existing = session_id.and_then(|id| self.sessions.get(id));
            Some(existing.unwrap_or_else(|| {
                self.sessions.create(
                    trik_id,
                    manifest.session_duration_ms(),
                    manifest.max_history_entries(),
                )
            }))
        } else {
            None
        };

        let config_map = {
            let store = self.config_store.read();
            let context = store.context_for(manifest);
            if context.is_empty() {
                None
            } else {
                Some(context.to_map())
            }
        };

        let storage = if manifest.storage_enabled() {
            Some(
                TrikStorage::new(Arc::clone(&self.storage), trik_id)
                    .with_max_size(manifest.max_storage_bytes()),
            )
        } else {
            None
        };

        let skill_input = SkillInput {
            action: action_name.to_string(),
            input: input.clone(),
            session: session.as_ref().map(|s| s.context()),
            config: config_map,
        };
        let timeout = Duration::from_millis(manifest.limits.max_execution_time_ms);

        // DISPATCH.
        let output = match loaded.runtime {
            TrikRuntime::Native => self.dispatch_native(trik_id, skill_input, storage, timeout).await,
            runtime @ (TrikRuntime::Node | TrikRuntime::Python) => {
                self.dispatch_worker(runtime, &loaded.path, skill_input, storage, timeout)
                    .await
            }
        };
        let output = match output {
            Ok(output) => output,
            Err(result) => return result,
        };

        // Clarification short-circuits output validation.
        if output.needs_clarification {
            let questions = output.clarification_questions.unwrap_or_default();
            return GatewayResult::clarification(
                questions,
                session.map(|s| s.session_id),
            );
        }

        // VALIDATE_OUTPUT and build the caller-facing result.
        match action.response_mode {
            ResponseMode::Passthrough => {
                self.finish_passthrough(trik_id, action_name, action, session, input, output)
            }
            ResponseMode::Template => {
                self.finish_template(action_name, action, session, input, output)
            }
        }
    }

    async fn dispatch_native(
        &self,
        trik_id: &str,
        skill_input: SkillInput,
        storage: Option<TrikStorage>,
        timeout: Duration,
    ) -> Result<SkillOutput, GatewayResult> {
        let Some(graph) = self.natives.get(trik_id) else {
            return Err(GatewayResult::error(
                ErrorCode::InternalError,
                format!("no native graph registered for \"{trik_id}\""),
            ));
        };
        match tokio::time::timeout(timeout, graph.invoke(skill_input, storage)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(GatewayResult::error(ErrorCode::InternalError, e.to_string())),
            Err(_) => Err(GatewayResult::error(
                ErrorCode::ExecutionTimeout,
                format!("execution timed out after {}ms", timeout.as_millis()),
            )),
        }
    }

    async fn dispatch_worker(
        &self,
        runtime: TrikRuntime,
        trik_path: &Path,
        skill_input: SkillInput,
        storage: Option<TrikStorage>,
        timeout: Duration,
    ) -> Result<SkillOutput, GatewayResult> {
        let params = InvokeParams {
            trik_path: trik_path.to_string_lossy().into_owned(),
            action: skill_input.action,
            input: skill_input.input,
            session: skill_input.session,
            config: skill_input.config,
        };
        self.workers
            .invoke(runtime, params, storage, Some(timeout))
            .await
            .map_err(|e| match e {
                WorkerError::Timeout(ms) => GatewayResult::error(
                    ErrorCode::ExecutionTimeout,
                    format!("execution timed out after {ms}ms"),
                ),
                WorkerError::ChannelClosed => GatewayResult::error(
                    ErrorCode::WorkerNotReady,
                    "worker channel terminated during execution",
                ),
                WorkerError::Spawn(message)
                | WorkerError::Health(message) => {
                    GatewayResult::error(ErrorCode::WorkerNotReady, message)
                }
                WorkerError::StartupTimeout(ms) => GatewayResult::error(
                    ErrorCode::WorkerNotReady,
                    format!("worker startup timed out after {ms}ms"),
                ),
                WorkerError::Rpc { code, message } => {
                    GatewayResult::error(ErrorCode::from_rpc_code(code), message)
                }
                WorkerError::BadResult(message) => {
                    GatewayResult::error(ErrorCode::InternalError, message)
                }
            })
    }

    fn finish_passthrough(
        &self,
        trik_id: &str,
        action_name: &str,
        action: &trikhub_manifest::ActionDefinition,
        session: Option<crate::session::Session>,
        input: Value,
        output: SkillOutput,
    ) -> GatewayResult {
        let Some(user_content) = output.user_content else {
            return GatewayResult::error(
                ErrorCode::SchemaValidationFailed,
                "passthrough action returned no userContent",
            );
        };

        if let Some(schema) = &action.user_content_schema {
            let as_value = match serde_json::to_value(&user_content) {
                Ok(value) => value,
                Err(e) => {
                    return GatewayResult::error(ErrorCode::InternalError, e.to_string());
                }
            };
            let violations = schema.validate(&as_value);
            if !violations.is_empty() {
                let detail: Vec<String> = violations.iter().map(ToString::to_string).collect();
                // The content is discarded, never stored.
                return GatewayResult::error(
                    ErrorCode::SchemaValidationFailed,
                    format!("invalid userContent: {}", detail.join("; ")),
                );
            }
        }

        let session_id = self.finish_session(session, action_name, input, None, output.end_session);

        let content_type = user_content.content_type.clone();
        let metadata = user_content.metadata.clone();
        let content_ref = self.content.put(trik_id, action_name, user_content);

        GatewayResult::passthrough(content_ref, content_type, metadata, session_id)
    }

    fn finish_template(
        &self,
        action_name: &str,
        action: &trikhub_manifest::ActionDefinition,
        session: Option<crate::session::Session>,
        input: Value,
        output: SkillOutput,
    ) -> GatewayResult {
        let Some(agent_data) = output.agent_data else {
            return GatewayResult::error(
                ErrorCode::SchemaValidationFailed,
                "template action returned no agentData",
            );
        };

        if let Some(schema) = &action.agent_data_schema {
            let violations = schema.validate(&agent_data);
            if !violations.is_empty() {
                let detail: Vec<String> = violations.iter().map(ToString::to_string).collect();
                return GatewayResult::error(
                    ErrorCode::SchemaValidationFailed,
                    format!("invalid agentData: {}", detail.join("; ")),
                );
            }
        }

        let Some(selected) = template::select_template(action, &agent_data) else {
            return GatewayResult::error(
                ErrorCode::SchemaValidationFailed,
                format!("no response template resolvable for action \"{action_name}\""),
            );
        };
        let template_text = template::render(selected, &agent_data);

        let session_id = self.finish_session(
            session,
            action_name,
            input,
            Some(agent_data.clone()),
            output.end_session,
        );

        GatewayResult::template(agent_data, template_text, session_id)
    }

    /// Append to session history (input and agent-visible data only) and
    /// honour `endSession`.
    fn finish_session(
        &self,
        session: Option<crate::session::Session>,
        action_name: &str,
        input: Value,
        agent_data: Option<Value>,
        end_session: bool,
    ) -> Option<SessionId> {
        let session = session?;
        if end_session {
            self.sessions.delete(&session.session_id);
            return None;
        }
        self.sessions
            .add_history(&session.session_id, action_name, input, agent_data);
        Some(session.session_id)
    }

    /// Redeem a passthrough receipt: first call returns the content, any
    /// further call returns `None`.
    pub fn deliver_content(&self, content_ref: &ContentRef) -> Option<DeliveredContent> {
        self.content.take(content_ref)
    }

    pub fn has_content(&self, content_ref: &ContentRef) -> bool {
        self.content.contains(content_ref)
    }

    pub fn content_info(&self, content_ref: &ContentRef) -> Option<ContentInfo> {
        self.content.info(content_ref)
    }

    /// Current storage usage for a trik, in bytes.
    pub fn storage_usage(&self, trik_id: &str) -> Result<u64, StorageError> {
        self.storage.usage(trik_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Reload the secrets layers from disk.
    pub fn reload_config(&self) {
        if let Err(e) = self.config_store.write().reload() {
            warn!(error = %e, "failed to reload config store");
        }
    }

    /// Stop workers, drop sessions, and clear pending content.
    pub async fn shutdown(&self) {
        self.workers.shutdown_all().await;
        self.sessions.clear();
        self.content.clear();
        info!("gateway shut down");
    }
}
