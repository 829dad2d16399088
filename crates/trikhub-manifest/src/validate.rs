//! Two-phase manifest validation.
//!
//! Phase one is structural: the raw document must have the required fields
//! with the right shapes, `schemaVersion` 1, a semver-shaped `version`, and
//! each action must match exactly one of the two response-mode shapes.
//! Structural failures short-circuit. Phase two is the security audit,
//! whose failures are collected exhaustively so the linter can report them
//! all.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::security;
use crate::types::TrikManifest;

pub const MANIFEST_SCHEMA_VERSION: u64 = 1;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+").unwrap());

/// A validation failure, addressed by dotted path into the manifest document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest not found at {}", .0.display())]
    NotFound(std::path::PathBuf),
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid manifest: {}", format_issues(.0))]
    Invalid(Vec<ManifestIssue>),
}

fn format_issues(issues: &[ManifestIssue]) -> String {
    issues
        .iter()
        .map(ManifestIssue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn issue(path: impl Into<String>, message: impl Into<String>) -> ManifestIssue {
    ManifestIssue { path: path.into(), message: message.into() }
}

/// Phase one: structural checks against the raw document.
pub fn structural_issues(raw: &Value) -> Vec<ManifestIssue> {
    let mut issues = Vec::new();

    let Some(root) = raw.as_object() else {
        return vec![issue("root", "manifest must be a JSON object")];
    };

    match root.get("schemaVersion") {
        Some(Value::Number(n)) if n.as_u64() == Some(MANIFEST_SCHEMA_VERSION) => {}
        Some(_) => issues.push(issue(
            "schemaVersion",
            format!("schemaVersion must be {MANIFEST_SCHEMA_VERSION}"),
        )),
        None => issues.push(issue("schemaVersion", "missing required field")),
    }

    for field in ["id", "name", "description", "version"] {
        match root.get(field) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => issues.push(issue(field, "must not be empty")),
            Some(_) => issues.push(issue(field, "must be a string")),
            None => issues.push(issue(field, "missing required field")),
        }
    }

    if let Some(Value::String(version)) = root.get("version") {
        if !VERSION_RE.is_match(version) {
            issues.push(issue("version", "must match MAJOR.MINOR.PATCH"));
        }
    }

    match root.get("actions") {
        Some(Value::Object(actions)) if !actions.is_empty() => {
            for (name, action) in actions {
                check_action(name, action, &mut issues);
            }
        }
        Some(Value::Object(_)) => {
            issues.push(issue("actions", "must define at least one action"));
        }
        Some(_) => issues.push(issue("actions", "must be an object")),
        None => issues.push(issue("actions", "missing required field")),
    }

    match root.get("capabilities") {
        Some(Value::Object(capabilities)) => {
            match capabilities.get("tools") {
                Some(Value::Array(tools)) => {
                    if tools.iter().any(|t| !t.is_string()) {
                        issues.push(issue("capabilities.tools", "entries must be strings"));
                    }
                }
                Some(_) => issues.push(issue("capabilities.tools", "must be an array")),
                None => issues.push(issue("capabilities.tools", "missing required field")),
            }
        }
        Some(_) => issues.push(issue("capabilities", "must be an object")),
        None => issues.push(issue("capabilities", "missing required field")),
    }

    match root.get("limits") {
        Some(Value::Object(limits)) => {
            for field in ["maxExecutionTimeMs", "maxLlmCalls", "maxToolCalls"] {
                match limits.get(field) {
                    Some(Value::Number(n)) if n.as_f64().unwrap_or(-1.0) >= 0.0 => {}
                    Some(_) => issues.push(issue(
                        format!("limits.{field}"),
                        "must be a non-negative number",
                    )),
                    None => {
                        issues.push(issue(format!("limits.{field}"), "missing required field"))
                    }
                }
            }
        }
        Some(_) => issues.push(issue("limits", "must be an object")),
        None => issues.push(issue("limits", "missing required field")),
    }

    match root.get("entry") {
        Some(Value::Object(entry)) => {
            for field in ["module", "export"] {
                match entry.get(field) {
                    Some(Value::String(s)) if !s.is_empty() => {}
                    Some(_) => {
                        issues.push(issue(format!("entry.{field}"), "must be a non-empty string"))
                    }
                    None => {
                        issues.push(issue(format!("entry.{field}"), "missing required field"))
                    }
                }
            }
            if let Some(runtime) = entry.get("runtime") {
                match runtime.as_str() {
                    Some("native" | "node" | "python") => {}
                    _ => issues.push(issue(
                        "entry.runtime",
                        "must be one of: native, node, python",
                    )),
                }
            }
        }
        Some(_) => issues.push(issue("entry", "must be an object")),
        None => issues.push(issue("entry", "missing required field")),
    }

    issues
}

/// Each action must match its response mode's shape.
fn check_action(name: &str, action: &Value, issues: &mut Vec<ManifestIssue>) {
    let path = format!("actions.{name}");

    let Some(action) = action.as_object() else {
        issues.push(issue(path, "must be an object"));
        return;
    };

    if !action
        .get("inputSchema")
        .map(Value::is_object)
        .unwrap_or(false)
    {
        issues.push(issue(format!("{path}.inputSchema"), "missing or not an object"));
    }

    match action.get("responseMode").and_then(Value::as_str) {
        Some("template") => {
            if !action
                .get("agentDataSchema")
                .map(Value::is_object)
                .unwrap_or(false)
            {
                issues.push(issue(
                    format!("{path}.agentDataSchema"),
                    "template mode requires agentDataSchema",
                ));
            }
            match action.get("responseTemplates") {
                Some(Value::Object(templates)) if !templates.is_empty() => {
                    for (template_id, template) in templates {
                        if !template
                            .get("text")
                            .map(Value::is_string)
                            .unwrap_or(false)
                        {
                            issues.push(issue(
                                format!("{path}.responseTemplates.{template_id}"),
                                "template must have a text string",
                            ));
                        }
                    }
                }
                _ => issues.push(issue(
                    format!("{path}.responseTemplates"),
                    "template mode requires at least one response template",
                )),
            }
        }
        Some("passthrough") => {
            if !action
                .get("userContentSchema")
                .map(Value::is_object)
                .unwrap_or(false)
            {
                issues.push(issue(
                    format!("{path}.userContentSchema"),
                    "passthrough mode requires userContentSchema",
                ));
            }
        }
        Some(other) => issues.push(issue(
            format!("{path}.responseMode"),
            format!("invalid responseMode \"{other}\""),
        )),
        None => issues.push(issue(
            format!("{path}.responseMode"),
            "missing required field",
        )),
    }
}

/// Phase two: the security audit over a structurally valid manifest.
pub fn security_issues(manifest: &TrikManifest) -> Vec<ManifestIssue> {
    let mut issues = Vec::new();

    for (action_name, action) in &manifest.actions {
        if let Some(agent_schema) = &action.agent_data_schema {
            issues.extend(security::check_agent_data_schema(
                agent_schema,
                &format!("actions.{action_name}.agentDataSchema"),
            ));
        }
        if let Some(templates) = &action.response_templates {
            issues.extend(security::check_template_fields(
                templates,
                action.agent_data_schema.as_ref(),
                &format!("actions.{action_name}.responseTemplates"),
            ));
        }
    }

    issues
}

/// Run both phases and produce a typed manifest, or every issue found.
pub fn parse_manifest(raw: &Value) -> Result<TrikManifest, Vec<ManifestIssue>> {
    let structural = structural_issues(raw);
    if !structural.is_empty() {
        return Err(structural);
    }

    let manifest: TrikManifest = serde_json::from_value(raw.clone())
        .map_err(|e| vec![issue("root", format!("failed to parse manifest: {e}"))])?;

    let security = security_issues(&manifest);
    if !security.is_empty() {
        return Err(security);
    }

    Ok(manifest)
}
