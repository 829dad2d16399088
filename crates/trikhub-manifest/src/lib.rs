//! Trik manifests: parsing, schema validation, and the security invariants
//! that make agent-visible data safe.
//!
//! Validation runs in two phases. The structural phase checks the manifest
//! document against the fixed shape (required fields, mode-specific action
//! shapes). The security phase proves that no unconstrained string can reach
//! the agent: every string-typed leaf in an `agentDataSchema` must be fixed
//! by an enum, const, pattern, or safe format, and every template placeholder
//! must resolve to a declared field.

pub mod load;
pub mod schema;
pub mod security;
pub mod types;
pub mod validate;

pub use load::{find_manifest_location, load_manifest_dir, ManifestLocation, PackageKind};
pub use schema::{JsonSchema, SchemaViolation};
pub use types::{
    ActionDefinition, Capabilities, ConfigRequirement, Entry, Limits, ResponseTemplate,
    SessionCapabilities, StorageCapabilities, TrikConfigSpec, TrikManifest, TrikRuntime,
};
pub use validate::{parse_manifest, ManifestError, ManifestIssue};
