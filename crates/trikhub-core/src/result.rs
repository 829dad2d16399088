use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, GatewayError};
use crate::ids::{ContentRef, SessionId};
use crate::skill::{ClarificationQuestion, ResponseMode};

/// The union every gateway call resolves to. Serialized untagged: the wire
/// shape is distinguished by `success` / `responseMode` / `needsClarification`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayResult {
    Template(TemplateSuccess),
    Passthrough(PassthroughSuccess),
    Clarification(Clarification),
    Error(ErrorResult),
}

/// Successful template-mode invocation: constrained structured data plus the
/// rendered template text.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSuccess {
    pub success: bool,
    pub response_mode: ResponseMode,
    pub agent_data: Value,
    pub template_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Successful passthrough invocation: the agent sees only the receipt
/// reference and non-content metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughSuccess {
    pub success: bool,
    pub response_mode: ResponseMode,
    pub user_content_ref: ContentRef,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// The skill needs more information before it can act.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clarification {
    pub success: bool,
    pub needs_clarification: bool,
    pub questions: Vec<ClarificationQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// A typed failure. Never an exception: errors are data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub success: bool,
    pub code: ErrorCode,
    pub error: String,
}

impl GatewayResult {
    pub fn template(agent_data: Value, template_text: String, session_id: Option<SessionId>) -> Self {
        Self::Template(TemplateSuccess {
            success: true,
            response_mode: ResponseMode::Template,
            agent_data,
            template_text,
            session_id,
        })
    }

    pub fn passthrough(
        user_content_ref: ContentRef,
        content_type: String,
        metadata: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self::Passthrough(PassthroughSuccess {
            success: true,
            response_mode: ResponseMode::Passthrough,
            user_content_ref,
            content_type,
            metadata,
            session_id,
        })
    }

    pub fn clarification(
        questions: Vec<ClarificationQuestion>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self::Clarification(Clarification {
            success: true,
            needs_clarification: true,
            questions,
            session_id,
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResult {
            success: false,
            code,
            error: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Template(r) => r.session_id.as_ref(),
            Self::Passthrough(r) => r.session_id.as_ref(),
            Self::Clarification(r) => r.session_id.as_ref(),
            Self::Error(_) => None,
        }
    }
}

impl From<GatewayError> for GatewayResult {
    fn from(err: GatewayError) -> Self {
        Self::error(err.code, err.message)
    }
}
