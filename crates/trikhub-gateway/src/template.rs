//! Template selection and placeholder substitution.
//!
//! A template action's `agentData.template` field selects the response
//! template; `success` is the fallback, then a sole entry. `{{name}}` is
//! replaced with the stringified `agentData` field; placeholders for absent
//! fields stay literal (only possible for dynamically missing optional
//! fields once the placeholder closure holds).

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use trikhub_manifest::{ActionDefinition, ResponseTemplate};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

/// Pick the response template for this result.
///
/// `None` means the `agentData.template` field named a template the action
/// does not declare, or the action declares several templates and neither a
/// selector nor a `success` entry disambiguates.
pub fn select_template<'a>(
    action: &'a ActionDefinition,
    agent_data: &Value,
) -> Option<&'a ResponseTemplate> {
    let templates = action.response_templates.as_ref()?;

    if let Some(selector) = agent_data.get("template").and_then(Value::as_str) {
        return templates.get(selector);
    }
    if let Some(template) = templates.get("success") {
        return Some(template);
    }
    if templates.len() == 1 {
        return templates.values().next();
    }
    None
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fill `{{name}}` placeholders from `agentData` fields.
pub fn render(template: &ResponseTemplate, agent_data: &Value) -> String {
    PLACEHOLDER_RE
        .replace_all(&template.text, |captures: &Captures<'_>| {
            let field = &captures[1];
            match agent_data.get(field) {
                Some(Value::Null) | None => Cow::Owned(captures[0].to_string()),
                Some(value) => Cow::Owned(stringify(value)),
            }
        })
        .into_owned()
}
