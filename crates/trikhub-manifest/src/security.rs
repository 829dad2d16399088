//! The agent-visible string constraint and template placeholder closure.
//!
//! Every string-typed leaf in an `agentDataSchema` must be pinned down by an
//! enum, a const, a pattern, or a format from the safe-list. Anything else
//! could carry injected instructions into the agent's context, so the loader
//! refuses the manifest outright.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::schema::{JsonSchema, TypeSet};
use crate::validate::ManifestIssue;

/// Formats considered safe for agent-visible strings: each admits only
/// machine-shaped values, never free prose.
pub const SAFE_FORMATS: &[&str] = &["id", "date", "date-time", "time", "uuid", "email", "uri", "url"];

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

/// Whether a string-typed schema node fixes its value enough to be
/// agent-visible.
pub fn is_constrained_string(schema: &JsonSchema) -> bool {
    if schema
        .enum_values
        .as_ref()
        .map(|values| !values.is_empty())
        .unwrap_or(false)
    {
        return true;
    }
    if schema.const_value.is_some() {
        return true;
    }
    if schema.pattern.is_some() {
        return true;
    }
    if let Some(format) = &schema.format {
        return SAFE_FORMATS.contains(&format.as_str());
    }
    false
}

fn allows_string(schema: &JsonSchema) -> bool {
    match &schema.schema_type {
        Some(TypeSet::One(t)) => t == "string",
        Some(TypeSet::Many(ts)) => ts.iter().any(|t| t == "string"),
        None => false,
    }
}

/// Walk an `agentDataSchema` and collect every string-typed leaf that fails
/// the constrained-string predicate.
pub fn check_agent_data_schema(schema: &JsonSchema, base_path: &str) -> Vec<ManifestIssue> {
    let mut issues = Vec::new();
    walk(schema, base_path, &mut issues);
    issues
}

fn walk(schema: &JsonSchema, path: &str, issues: &mut Vec<ManifestIssue>) {
    if allows_string(schema) && !is_constrained_string(schema) {
        issues.push(ManifestIssue {
            path: path.to_string(),
            message: "unconstrained string in agent-visible data: add an enum, const, \
                      pattern, or a safe format (id, date, date-time, time, uuid, email, uri/url)"
                .to_string(),
        });
    }

    if let Some(properties) = &schema.properties {
        for (name, prop) in properties {
            walk(prop, &format!("{path}.properties.{name}"), issues);
        }
    }
    if let Some(items) = &schema.items {
        walk(items, &format!("{path}.items"), issues);
    }
    if let Some(defs) = &schema.defs {
        for (name, def) in defs {
            walk(def, &format!("{path}.$defs.{name}"), issues);
        }
    }
}

/// Extract `{{name}}` placeholder names from a template in one regex pass.
pub fn extract_placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Check every template placeholder resolves to a declared agent-data
/// property.
pub fn check_template_fields(
    templates: &BTreeMap<String, crate::types::ResponseTemplate>,
    agent_data_schema: Option<&JsonSchema>,
    base_path: &str,
) -> Vec<ManifestIssue> {
    let empty = BTreeMap::new();
    let properties = agent_data_schema
        .and_then(|schema| schema.properties.as_ref())
        .unwrap_or(&empty);

    let mut issues = Vec::new();
    for (template_id, template) in templates {
        for placeholder in extract_placeholders(&template.text) {
            if !properties.contains_key(&placeholder) {
                issues.push(ManifestIssue {
                    path: format!("{base_path}.{template_id}"),
                    message: format!(
                        "template placeholder {{{{{placeholder}}}}} is not a declared \
                         agentDataSchema property"
                    ),
                });
            }
        }
    }
    issues
}
