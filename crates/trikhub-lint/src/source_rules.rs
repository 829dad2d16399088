//! Source checks for same-runtime (JS/TS) packages.
//!
//! Workers are not sandboxed; the static audit is the backstop. These rules
//! flag capabilities a trik must not reach for directly: the filesystem,
//! subprocesses, raw sockets, dynamic code evaluation, undeclared tools, and
//! ambient environment access.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostics::{Diagnostic, Severity};

/// Modules a trik may not import.
const FORBIDDEN_MODULES: &[&str] = &[
    "fs", "child_process", "net", "http", "https", "dns", "tls",
];

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:require\s*\(\s*|from\s+|import\s+)['"](?:node:)?([a-z_]+)(?:/[^'"]*)?['"]"#,
    )
    .unwrap()
});
static EVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s*\(|new\s+Function\s*\(").unwrap());
static TOOL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"callTool\s*\(\s*['"]([\w@/-]+)['"]"#).unwrap());
static ENV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bprocess\.env\b").unwrap());

const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts"];
const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build"];

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Collect source files under a package directory, skipping dependency and
/// build output trees.
pub fn collect_source_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                stack.push(path);
            } else if is_source_file(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Lint one source file's text.
pub fn lint_source(
    text: &str,
    display_path: &str,
    declared_tools: &HashSet<String>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with('*') {
            continue;
        }

        for captures in IMPORT_RE.captures_iter(line) {
            let module = &captures[1];
            if FORBIDDEN_MODULES.contains(&module) {
                let column = captures.get(0).map(|m| m.start() + 1).unwrap_or(1);
                diagnostics.push(
                    Diagnostic::new(
                        "forbidden-imports",
                        Severity::Error,
                        format!("import of restricted module \"{module}\""),
                        display_path,
                    )
                    .at(line_number, column),
                );
            }
        }

        if let Some(found) = EVAL_RE.find(line) {
            diagnostics.push(
                Diagnostic::new(
                    "no-dynamic-code",
                    Severity::Error,
                    "dynamic code execution (eval / new Function)",
                    display_path,
                )
                .at(line_number, found.start() + 1),
            );
        }

        for captures in TOOL_CALL_RE.captures_iter(line) {
            let tool = &captures[1];
            if !declared_tools.contains(tool) {
                let column = captures.get(0).map(|m| m.start() + 1).unwrap_or(1);
                diagnostics.push(
                    Diagnostic::new(
                        "undeclared-tools",
                        Severity::Error,
                        format!("tool \"{tool}\" is not declared in capabilities.tools"),
                        display_path,
                    )
                    .at(line_number, column),
                );
            }
        }

        if let Some(found) = ENV_RE.find(line) {
            diagnostics.push(
                Diagnostic::new(
                    "env-access",
                    Severity::Info,
                    "direct environment-variable access; prefer declared config keys",
                    display_path,
                )
                .at(line_number, found.start() + 1),
            );
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint(text: &str) -> Vec<Diagnostic> {
        lint_source(text, "src/index.js", &HashSet::new())
    }

    #[test]
    fn flags_forbidden_requires_and_imports() {
        let diagnostics = lint(
            "const fs = require('fs');\nimport { exec } from 'child_process';\nimport net from \"node:net\";\n",
        );
        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.iter().all(|d| d.rule == "forbidden-imports"));
        assert_eq!(diagnostics[0].line, Some(1));
        assert_eq!(diagnostics[1].line, Some(2));
    }

    #[test]
    fn allows_benign_imports() {
        let diagnostics = lint("import { z } from 'zod';\nconst path = require('./helpers');\n");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn subpath_of_forbidden_module_is_flagged() {
        let diagnostics = lint("const promises = require('fs/promises');\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, "forbidden-imports");
    }

    #[test]
    fn flags_eval_and_function_constructor() {
        let diagnostics = lint("const out = eval(code);\nconst f = new Function('return 1');\n");
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.rule == "no-dynamic-code"));
    }

    #[test]
    fn evaluate_is_not_eval() {
        let diagnostics = lint("const score = evaluate(model);\n");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn undeclared_tool_use_flagged_declared_allowed() {
        let declared: HashSet<String> = ["web-search".to_string()].into_iter().collect();
        let diagnostics = lint_source(
            "await ctx.callTool('web-search', q);\nawait ctx.callTool('shell-exec', cmd);\n",
            "src/graph.js",
            &declared,
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, "undeclared-tools");
        assert!(diagnostics[0].message.contains("shell-exec"));
    }

    #[test]
    fn env_access_is_info() {
        let diagnostics = lint("const key = process.env.API_KEY;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, "env-access");
        assert_eq!(diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn comments_are_ignored() {
        let diagnostics = lint("// const fs = require('fs');\n * eval(x)\n");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn collects_only_source_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/dep")).unwrap();
        std::fs::write(tmp.path().join("src/index.ts"), "").unwrap();
        std::fs::write(tmp.path().join("src/data.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("node_modules/dep/index.js"), "").unwrap();

        let files = collect_source_files(tmp.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/index.ts"));
    }
}
