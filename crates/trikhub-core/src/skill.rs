use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;

/// How an action's result reaches the caller.
///
/// `Template`: structured agent-visible data rendered through a declared
/// template. `Passthrough`: free text that bypasses the agent entirely and is
/// redeemed by receipt reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Template,
    Passthrough,
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// One prior invocation in a session. Passthrough content is never recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: i64,
    pub action: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_data: Option<Value>,
}

/// Session context handed to skill code.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: SessionId,
    pub history: Vec<HistoryEntry>,
}

/// Free-form content destined for the user, never the agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughContent {
    pub content_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A clarification question a skill may pose back to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationQuestion {
    pub question_id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    MultipleChoice,
    Boolean,
}

/// Input delivered to a skill for one invocation.
///
/// The storage handle travels alongside this struct (it is a live object,
/// not wire data).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillInput {
    pub action: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<std::collections::BTreeMap<String, String>>,
}

/// Raw result returned by skill code, before the gateway validates it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_content: Option<PassthroughContent>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_questions: Option<Vec<ClarificationQuestion>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub end_session: bool,
}
