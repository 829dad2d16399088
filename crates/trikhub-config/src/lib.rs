//! Gateway configuration: the registry config file listing installed triks
//! and the layered secrets store feeding per-trik config contexts.

pub mod registry;
pub mod secrets;

pub use registry::RegistryConfig;
pub use secrets::{ConfigStore, ConfigStoreOptions, TrikConfigContext};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
