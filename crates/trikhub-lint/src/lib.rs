//! Static audit of a trik package before install or publish.
//!
//! The linter is a pure function of the files on disk: manifest rules prove
//! the security invariants hold (no free-form strings in agent-visible data,
//! template placeholders resolve), source rules flag dangerous constructs in
//! same-runtime packages. It performs no network I/O.

pub mod diagnostics;
pub mod linter;
pub mod source_rules;

pub use diagnostics::{Diagnostic, LintReport, Severity};
pub use linter::{lint_package, LintOptions};
