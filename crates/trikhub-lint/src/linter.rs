//! Rule orchestration over a trik package directory.

use std::collections::HashSet;
use std::path::Path;

use trikhub_manifest::validate::{security_issues, structural_issues};
use trikhub_manifest::{find_manifest_location, PackageKind, TrikManifest};

use crate::diagnostics::{Diagnostic, LintReport, Severity};
use crate::source_rules;

/// Execution-time limits above this draw a completeness warning.
const HIGH_EXECUTION_TIME_MS: u64 = 120_000;

#[derive(Clone, Debug, Default)]
pub struct LintOptions {
    /// Promote warnings to errors.
    pub warnings_as_errors: bool,
    /// Rule names to suppress entirely.
    pub skip: HashSet<String>,
    /// Assert the compiled entry artifact exists (publish mode).
    pub require_entry_artifact: bool,
}

/// Lint a trik package directory. Pure function of its inputs: reads files,
/// touches no network.
pub fn lint_package(package_dir: &Path, options: &LintOptions) -> LintReport {
    let mut diagnostics = Vec::new();

    let Some(location) = find_manifest_location(package_dir) else {
        diagnostics.push(Diagnostic::new(
            "valid-manifest",
            Severity::Error,
            "missing manifest.json",
            package_dir.display().to_string(),
        ));
        return finish(diagnostics, options);
    };

    let manifest_file = location.manifest_path.display().to_string();

    let raw: serde_json::Value = match std::fs::read_to_string(&location.manifest_path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(raw) => raw,
        Err(message) => {
            diagnostics.push(Diagnostic::new(
                "valid-manifest",
                Severity::Error,
                format!("unreadable manifest: {message}"),
                manifest_file,
            ));
            return finish(diagnostics, options);
        }
    };

    // Structural phase. Template-presence failures get their own rule name.
    let structural = structural_issues(&raw);
    for issue in &structural {
        let rule = if issue.message.contains("response template") {
            "has-response-templates"
        } else {
            "valid-manifest"
        };
        diagnostics.push(Diagnostic::new(
            rule,
            Severity::Error,
            issue.to_string(),
            manifest_file.clone(),
        ));
    }
    if !structural.is_empty() {
        return finish(diagnostics, options);
    }

    let manifest: TrikManifest = match serde_json::from_value(raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                "valid-manifest",
                Severity::Error,
                format!("failed to parse manifest: {e}"),
                manifest_file,
            ));
            return finish(diagnostics, options);
        }
    };

    // Security phase: collected exhaustively, never short-circuited.
    for issue in security_issues(&manifest) {
        let rule = if issue.path.contains("responseTemplates") {
            "template-fields-exist"
        } else {
            "no-free-strings-in-agent-data"
        };
        diagnostics.push(Diagnostic::new(
            rule,
            Severity::Error,
            issue.to_string(),
            manifest_file.clone(),
        ));
    }

    // Recommend a conventional default template.
    for (action_name, action) in &manifest.actions {
        let Some(templates) = &action.response_templates else {
            continue;
        };
        if templates.len() > 1 && !templates.contains_key("success") {
            diagnostics.push(Diagnostic::new(
                "default-template-recommended",
                Severity::Warning,
                format!(
                    "action \"{action_name}\" declares several templates but no \"success\" \
                     entry; results without a template selector will fail"
                ),
                manifest_file.clone(),
            ));
        }
    }

    // Completeness: optional metadata and suspicious limits.
    for (field, value) in [
        ("author", &manifest.author),
        ("repository", &manifest.repository),
        ("license", &manifest.license),
    ] {
        if value.is_none() {
            diagnostics.push(Diagnostic::new(
                "manifest-completeness",
                Severity::Info,
                format!("optional field \"{field}\" is not set"),
                manifest_file.clone(),
            ));
        }
    }
    if manifest.limits.max_execution_time_ms > HIGH_EXECUTION_TIME_MS {
        diagnostics.push(Diagnostic::new(
            "manifest-completeness",
            Severity::Warning,
            format!(
                "maxExecutionTimeMs is unusually high ({}ms > {}ms)",
                manifest.limits.max_execution_time_ms, HIGH_EXECUTION_TIME_MS
            ),
            manifest_file.clone(),
        ));
    }

    if options.require_entry_artifact {
        let module = manifest.entry.module.trim_start_matches("./");
        if !location.manifest_dir.join(module).exists() {
            diagnostics.push(Diagnostic::new(
                "entry-point-exists",
                Severity::Error,
                format!("entry artifact \"{}\" not found", manifest.entry.module),
                manifest_file.clone(),
            ));
        }
    }

    // Source rules apply to same-runtime packages only.
    if location.kind == PackageKind::SameRuntime {
        let declared_tools: HashSet<String> =
            manifest.capabilities.tools.iter().cloned().collect();
        for file in source_rules::collect_source_files(&location.manifest_dir) {
            let Ok(text) = std::fs::read_to_string(&file) else {
                continue;
            };
            let display = file
                .strip_prefix(&location.manifest_dir)
                .unwrap_or(&file)
                .display()
                .to_string();
            diagnostics.extend(source_rules::lint_source(&text, &display, &declared_tools));
        }
    }

    finish(diagnostics, options)
}

fn finish(diagnostics: Vec<Diagnostic>, options: &LintOptions) -> LintReport {
    let mut diagnostics: Vec<Diagnostic> = diagnostics
        .into_iter()
        .filter(|diagnostic| !options.skip.contains(&diagnostic.rule))
        .collect();

    if options.warnings_as_errors {
        for diagnostic in &mut diagnostics {
            if diagnostic.severity == Severity::Warning {
                diagnostic.severity = Severity::Error;
            }
        }
    }

    LintReport { diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_manifest() -> serde_json::Value {
        json!({
            "schemaVersion": 1,
            "id": "@demo/articles",
            "name": "Articles",
            "description": "demo",
            "version": "1.0.0",
            "author": "demo",
            "repository": "https://example.com/demo",
            "license": "MIT",
            "actions": {
                "search": {
                    "responseMode": "template",
                    "inputSchema": {"type": "object"},
                    "agentDataSchema": {
                        "type": "object",
                        "properties": {
                            "template": {"type": "string", "enum": ["success", "empty"]},
                            "count": {"type": "integer"}
                        }
                    },
                    "responseTemplates": {
                        "success": {"text": "Found {{count}}."},
                        "empty": {"text": "None."}
                    }
                }
            },
            "capabilities": {"tools": ["web-search"]},
            "limits": {"maxExecutionTimeMs": 30000, "maxLlmCalls": 1, "maxToolCalls": 1},
            "entry": {"module": "./dist/index.js", "export": "graph"}
        })
    }

    fn write_package(manifest: &serde_json::Value) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("manifest.json"),
            serde_json::to_string_pretty(manifest).unwrap(),
        )
        .unwrap();
        tmp
    }

    #[test]
    fn clean_package_passes() {
        let tmp = write_package(&full_manifest());
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report.passed(), "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(!report.passed());
        assert_eq!(report.diagnostics[0].rule, "valid-manifest");
    }

    #[test]
    fn free_string_reported_under_its_rule() {
        let mut manifest = full_manifest();
        manifest["actions"]["search"]["agentDataSchema"]["properties"]["title"] =
            json!({"type": "string"});
        let tmp = write_package(&manifest);
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "no-free-strings-in-agent-data"
                && d.message.contains("properties.title")));
    }

    #[test]
    fn dangling_placeholder_reported() {
        let mut manifest = full_manifest();
        manifest["actions"]["search"]["responseTemplates"]["success"]["text"] =
            json!("Found {{total}}.");
        let tmp = write_package(&manifest);
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "template-fields-exist"));
    }

    #[test]
    fn missing_templates_reported_under_their_rule() {
        let mut manifest = full_manifest();
        manifest["actions"]["search"]
            .as_object_mut()
            .unwrap()
            .remove("responseTemplates");
        let tmp = write_package(&manifest);
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "has-response-templates" && d.severity == Severity::Error));
    }

    #[test]
    fn multiple_templates_without_success_is_a_warning() {
        let mut manifest = full_manifest();
        manifest["actions"]["search"]["responseTemplates"] = json!({
            "found": {"text": "Found {{count}}."},
            "empty": {"text": "None."}
        });
        let tmp = write_package(&manifest);
        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "default-template-recommended" && d.severity == Severity::Warning));
        // Warnings alone still pass.
        assert!(report.passed());
    }

    #[test]
    fn completeness_notes_missing_metadata_and_high_limits() {
        let mut manifest = full_manifest();
        manifest.as_object_mut().unwrap().remove("author");
        manifest["limits"]["maxExecutionTimeMs"] = json!(600_000);
        let tmp = write_package(&manifest);
        let report = lint_package(tmp.path(), &LintOptions::default());
        let completeness: Vec<&Diagnostic> = report
            .diagnostics
            .iter()
            .filter(|d| d.rule == "manifest-completeness")
            .collect();
        assert!(completeness
            .iter()
            .any(|d| d.severity == Severity::Info && d.message.contains("author")));
        assert!(completeness
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("unusually high")));
    }

    #[test]
    fn entry_point_check_is_opt_in() {
        let tmp = write_package(&full_manifest());
        let relaxed = lint_package(tmp.path(), &LintOptions::default());
        assert!(relaxed.passed());

        let strict = lint_package(
            tmp.path(),
            &LintOptions { require_entry_artifact: true, ..Default::default() },
        );
        assert!(strict
            .diagnostics
            .iter()
            .any(|d| d.rule == "entry-point-exists"));

        // Present artifact satisfies the rule.
        std::fs::create_dir_all(tmp.path().join("dist")).unwrap();
        std::fs::write(tmp.path().join("dist/index.js"), "export const graph = {};").unwrap();
        let satisfied = lint_package(
            tmp.path(),
            &LintOptions { require_entry_artifact: true, ..Default::default() },
        );
        assert!(satisfied.passed());
    }

    #[test]
    fn source_rules_run_for_same_runtime_packages() {
        let tmp = write_package(&full_manifest());
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(
            tmp.path().join("src/graph.js"),
            "const fs = require('fs');\nawait ctx.callTool('web-search', q);\nawait ctx.callTool('exec', c);\n",
        )
        .unwrap();

        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "forbidden-imports" && d.file == "src/graph.js"));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.rule == "undeclared-tools" && d.message.contains("exec")));
        // The declared tool draws no diagnostic.
        assert!(!report
            .diagnostics
            .iter()
            .any(|d| d.rule == "undeclared-tools" && d.message.contains("web-search")));
    }

    #[test]
    fn source_rules_skipped_for_cross_runtime_packages() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("pyproject.toml"), "[project]\n").unwrap();
        let package = tmp.path().join("articles_trik");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(
            package.join("manifest.json"),
            serde_json::to_string_pretty(&full_manifest()).unwrap(),
        )
        .unwrap();
        // A JS file in a python package layout is not scanned.
        std::fs::write(package.join("leftover.js"), "eval(x);\n").unwrap();

        let report = lint_package(tmp.path(), &LintOptions::default());
        assert!(report.passed(), "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn warnings_as_errors_promotes() {
        let mut manifest = full_manifest();
        manifest["limits"]["maxExecutionTimeMs"] = json!(600_000);
        let tmp = write_package(&manifest);

        let relaxed = lint_package(tmp.path(), &LintOptions::default());
        assert!(relaxed.passed());

        let strict = lint_package(
            tmp.path(),
            &LintOptions { warnings_as_errors: true, ..Default::default() },
        );
        assert!(!strict.passed());
    }

    #[test]
    fn skip_suppresses_rules() {
        let mut manifest = full_manifest();
        manifest["actions"]["search"]["agentDataSchema"]["properties"]["title"] =
            json!({"type": "string"});
        let tmp = write_package(&manifest);

        let options = LintOptions {
            skip: ["no-free-strings-in-agent-data".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let report = lint_package(tmp.path(), &options);
        assert!(report.passed(), "diagnostics: {:?}", report.diagnostics);
    }
}
