//! The TrikHub gateway core.
//!
//! Loads signed-off manifests, computes the agent-facing tool surface,
//! dispatches invocations in-process or to subprocess workers, validates
//! every result against the manifest's schemas, and splits responses into
//! the structured agent-visible channel and the opaque user-only channel.

pub mod content;
pub mod gateway;
pub mod runner;
pub mod session;
pub mod template;

pub use content::{ContentInfo, ContentStore, DeliveredContent, DeliveryReceipt};
pub use gateway::{GatewayConfig, ToolDefinition, TrikGateway, TrikInfo};
pub use runner::{GraphError, NativeRegistry, TrikGraph};
pub use session::{Session, SessionStore};
