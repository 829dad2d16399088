//! Shared types for the TrikHub gateway.
//!
//! Everything that crosses a crate boundary lives here: identifiers, the
//! gateway error taxonomy, the caller-facing result union, and the skill
//! input/output contract.

pub mod error;
pub mod ids;
pub mod result;
pub mod skill;

pub use error::{ErrorCode, GatewayError};
pub use ids::{ContentRef, RequestId, SessionId};
pub use result::GatewayResult;
pub use skill::{
    ClarificationQuestion, HistoryEntry, PassthroughContent, ResponseMode, SessionContext,
    SkillInput, SkillOutput,
};
