use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use trikhub_core::ResponseMode;

use crate::schema::JsonSchema;

pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_SESSION_DURATION_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 20;

/// Runtime hosting a trik's entry module. Absent in the manifest means the
/// host runtime (`Native`: a Rust graph registered with the gateway).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrikRuntime {
    Native,
    Node,
    Python,
}

impl std::fmt::Display for TrikRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Node => write!(f, "node"),
            Self::Python => write!(f, "python"),
        }
    }
}

/// Entry point configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub module: String,
    pub export: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<TrikRuntime>,
}

/// Session capability block.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapabilities {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_history_entries: Option<usize>,
}

/// Storage capability block.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCapabilities {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub tools: Vec<String>,
    #[serde(default)]
    pub can_request_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageCapabilities>,
}

/// Resource limits for trik execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub max_execution_time_ms: u64,
    pub max_llm_calls: u32,
    pub max_tool_calls: u32,
}

/// A configuration value the trik needs (API key, token, …).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigRequirement {
    pub key: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrikConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<ConfigRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<Vec<ConfigRequirement>>,
}

impl TrikConfigSpec {
    /// All declared keys, required first.
    pub fn declared_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        if let Some(required) = &self.required {
            keys.extend(required.iter().map(|r| r.key.as_str()));
        }
        if let Some(optional) = &self.optional {
            keys.extend(optional.iter().map(|r| r.key.as_str()));
        }
        keys
    }
}

/// A rendered-response template. `{{name}}` placeholders are filled from
/// `agentData` fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// One named operation on a trik.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub response_mode: ResponseMode,
    pub input_schema: JsonSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_data_schema: Option<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_templates: Option<BTreeMap<String, ResponseTemplate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_content_schema: Option<JsonSchema>,
}

/// The trik manifest: the single source of truth for a skill's contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrikManifest {
    pub schema_version: u32,
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub actions: BTreeMap<String, ActionDefinition>,
    pub capabilities: Capabilities,
    pub limits: Limits,
    pub entry: Entry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<TrikConfigSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl TrikManifest {
    /// Effective runtime: the entry's tag, or the host runtime when absent.
    pub fn runtime(&self) -> TrikRuntime {
        self.entry.runtime.unwrap_or(TrikRuntime::Native)
    }

    pub fn session_enabled(&self) -> bool {
        self.capabilities
            .session
            .as_ref()
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    pub fn storage_enabled(&self) -> bool {
        self.capabilities
            .storage
            .as_ref()
            .map(|s| s.enabled)
            .unwrap_or(false)
    }

    pub fn max_storage_bytes(&self) -> u64 {
        self.capabilities
            .storage
            .as_ref()
            .and_then(|s| s.max_size_bytes)
            .unwrap_or(DEFAULT_MAX_STORAGE_BYTES)
    }

    pub fn session_duration_ms(&self) -> u64 {
        self.capabilities
            .session
            .as_ref()
            .and_then(|s| s.max_duration_ms)
            .unwrap_or(DEFAULT_SESSION_DURATION_MS)
    }

    pub fn max_history_entries(&self) -> usize {
        self.capabilities
            .session
            .as_ref()
            .and_then(|s| s.max_history_entries)
            .unwrap_or(DEFAULT_MAX_HISTORY_ENTRIES)
    }
}
