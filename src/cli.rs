//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tycheck",
    version,
    about = "Tycheck (Rust + mypy)",
    long_about = "Tycheck — a scan coordinator driving the mypy type checker over Python sources.\n\nConfiguration precedence: CLI > tycheck.toml > defaults.",
    after_help = "Examples:\n  tycheck check\n  tycheck check src tests --args '--strict'\n  tycheck check --config-file mypy.ini --output json\n  tycheck doctor --interpreter .venv/bin/python",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
/// Supported subcommands for scanning and environment diagnosis.
pub enum Commands {
    /// Show version
    #[command(
        about = "Show version",
        long_about = "Print the current tycheck version."
    )]
    Version,
    /// Type-check Python sources
    #[command(
        about = "Run a type-check scan",
        long_about = "Collect Python sources under the project root (or the given paths), run the checker over them, and report diagnostics. Severity levels contribute to CI exits.",
        after_help = "Examples:\n  tycheck check\n  tycheck check src --args '--strict --no-error-summary'\n  tycheck check --mypy-path .venv/bin/mypy --output json"
    )]
    Check {
        #[arg(help = "Files or directories to scan (default: whole project)")]
        paths: Vec<String>,
        #[arg(long, help = "Project root (default: current dir)")]
        project_root: Option<String>,
        #[arg(long, help = "Path to the checker executable")]
        mypy_path: Option<String>,
        #[arg(long, help = "Checker config file (e.g. mypy.ini)")]
        config_file: Option<String>,
        #[arg(long, help = "Extra checker arguments, quoted as one string")]
        args: Option<String>,
        #[arg(long, help = "Python interpreter used for venv detection")]
        interpreter: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Probe the checker with -V before scanning")]
        precheck: bool,
    },
    /// Diagnose checker availability
    #[command(
        about = "Diagnose checker availability",
        long_about = "Show which checker executable would run, whether the interpreter belongs to a virtual environment, and whether a version probe succeeds.",
        after_help = "Examples:\n  tycheck doctor\n  tycheck doctor --interpreter .venv/bin/python"
    )]
    Doctor {
        #[arg(long, help = "Project root (default: current dir)")]
        project_root: Option<String>,
        #[arg(long, help = "Path to the checker executable")]
        mypy_path: Option<String>,
        #[arg(long, help = "Python interpreter used for venv detection")]
        interpreter: Option<String>,
    },
}
