use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use trikhub_lint::{lint_package, LintOptions};

#[derive(Parser)]
#[command(name = "trik-lint", about = "Statically audit a trik package")]
struct Args {
    /// Path to the trik package directory.
    path: PathBuf,

    /// Treat warnings as errors.
    #[arg(long)]
    warnings_as_errors: bool,

    /// Rule names to skip (repeatable).
    #[arg(long = "skip", value_name = "RULE")]
    skip: Vec<String>,

    /// Require the compiled entry artifact to exist (publish mode).
    #[arg(long)]
    require_entry: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let options = LintOptions {
        warnings_as_errors: args.warnings_as_errors,
        skip: args.skip.into_iter().collect::<HashSet<String>>(),
        require_entry_artifact: args.require_entry,
    };

    let report = lint_package(&args.path, &options);
    for diagnostic in &report.diagnostics {
        println!("{diagnostic}");
    }

    if report.passed() {
        println!(
            "lint passed ({} warning(s), {} diagnostic(s))",
            report.warning_count(),
            report.diagnostics.len()
        );
        ExitCode::SUCCESS
    } else {
        println!("lint failed ({} error(s))", report.error_count());
        ExitCode::FAILURE
    }
}
