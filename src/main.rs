//! Tycheck CLI binary entry point.
//! Collects sources, runs a blocking scan, and prints results.

use clap::Parser;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tycheck::cli::{Cli, Commands};
use tycheck::config::{self, Effective};
use tycheck::coordinator::run_scan_blocking;
use tycheck::errors::ScanError;
use tycheck::models::{SourceFile, SourceId, SourceKind};
use tycheck::{environment, output};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Check {
            paths,
            project_root,
            mypy_path,
            config_file,
            args,
            interpreter,
            output,
            precheck,
        } => {
            let eff = config::resolve_effective(
                project_root.as_deref(),
                mypy_path.as_deref(),
                config_file.as_deref(),
                args.as_deref(),
                interpreter.as_deref(),
                output.as_deref(),
                if precheck { Some(true) } else { None },
            );
            let sources = match collect_sources(&eff, &paths) {
                Ok(sources) => sources,
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(2);
                }
            };
            if sources.is_empty() {
                eprintln!("note: no Python sources matched; nothing to check");
                return;
            }
            match run_scan_blocking(eff.scan_settings(), sources.clone()) {
                Ok(result) => {
                    output::print_scan(&result, &sources, &eff.output);
                    if result.summary().errors > 0 {
                        std::process::exit(1);
                    }
                }
                Err(ScanError::Unavailable) => {
                    eprintln!(
                        "error: checker not found; install mypy, pass --mypy-path, or configure tycheck.toml"
                    );
                    std::process::exit(2);
                }
                Err(e) => {
                    eprintln!("error: scan failed: {e}");
                    std::process::exit(2);
                }
            }
        }
        Commands::Doctor {
            project_root,
            mypy_path,
            interpreter,
        } => {
            let eff = config::resolve_effective(
                project_root.as_deref(),
                mypy_path.as_deref(),
                None,
                None,
                interpreter.as_deref(),
                None,
                None,
            );
            doctor(&eff);
        }
    }
}

/// Collect checkable sources from the given paths (or the configured
/// include globs when no paths are passed), honoring exclude globs.
fn collect_sources(eff: &Effective, paths: &[String]) -> Result<Vec<SourceFile>, std::io::Error> {
    let excludes: Vec<Pattern> = eff
        .exclude
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    let mut files: Vec<PathBuf> = Vec::new();
    if paths.is_empty() {
        for pattern in &eff.include {
            let absolute = eff.project_root.join(pattern);
            let Ok(entries) = glob::glob(&absolute.to_string_lossy()) else {
                continue;
            };
            for entry in entries.flatten() {
                files.push(entry);
            }
        }
    } else {
        for raw in paths {
            let path = {
                let p = PathBuf::from(raw);
                if p.is_absolute() {
                    p
                } else {
                    eff.project_root.join(p)
                }
            };
            if path.is_dir() {
                for pattern in ["**/*.py", "**/*.pyi"] {
                    let under = path.join(pattern);
                    let Ok(entries) = glob::glob(&under.to_string_lossy()) else {
                        continue;
                    };
                    for entry in entries.flatten() {
                        files.push(entry);
                    }
                }
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();

    let mut sources = Vec::new();
    for (index, path) in files.into_iter().enumerate() {
        if SourceKind::classify(&path) != SourceKind::Python {
            continue;
        }
        if is_excluded(&path, &eff.project_root, &excludes) {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        sources.push(SourceFile::saved(
            SourceId(index as u64 + 1),
            path,
            content,
        ));
    }
    Ok(sources)
}

fn is_excluded(path: &Path, root: &Path, excludes: &[Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    excludes.iter().any(|p| p.matches_path(relative))
}

/// Report what a scan would run: resolved executable, venv status, and a
/// version probe of the checker.
fn doctor(eff: &Effective) {
    println!("project root: {}", eff.project_root.display());
    match &eff.interpreter {
        Some(interp) => {
            let venv = environment::is_venv_interpreter(interp);
            println!("interpreter: {} (venv: {})", interp.display(), venv);
        }
        None => println!("interpreter: not configured"),
    }
    let resolved = environment::resolve_executable(
        &eff.project_root,
        eff.mypy_path.as_deref(),
        eff.interpreter.as_deref(),
    );
    match resolved {
        Some(exe) => {
            println!("checker: {}", exe.display());
            let env = environment::build_env(eff.interpreter.as_deref(), &eff.env_overrides);
            if environment::smoke_check(&exe, &env) {
                println!("version probe: ok");
            } else {
                println!("version probe: FAILED");
                std::process::exit(2);
            }
        }
        None => {
            println!("checker: NOT FOUND");
            std::process::exit(2);
        }
    }
}
