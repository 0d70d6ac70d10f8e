//! Checker executable discovery and process environment construction.
//!
//! Resolution order: explicit configured path, then the executable next to
//! a virtual-environment interpreter, then the system PATH. The process
//! environment reproduces what interpreter tooling expects inside a venv
//! (VIRTUAL_ENV set, the venv bin directory prepended to PATH, PYTHONHOME
//! removed); getting this wrong makes the checker silently resolve type
//! stubs against the wrong interpreter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

pub const CHECKER_PACKAGE: &str = "mypy";

const ENV_VIRTUAL_ENV: &str = "VIRTUAL_ENV";
const ENV_PATH: &str = "PATH";
const ENV_PYTHONHOME: &str = "PYTHONHOME";

fn checker_executable_name() -> &'static str {
    if cfg!(windows) {
        "mypy.exe"
    } else {
        "mypy"
    }
}

fn activate_script_name() -> &'static str {
    if cfg!(windows) {
        "activate.bat"
    } else {
        "activate"
    }
}

/// A venv interpreter has an `activate` script sitting next to it.
pub fn is_venv_interpreter(interpreter: &Path) -> bool {
    interpreter
        .parent()
        .map(|dir| dir.join(activate_script_name()).is_file())
        .unwrap_or(false)
}

/// Root of the virtual environment containing `interpreter`
/// (the grandparent of e.g. `<root>/bin/python`).
pub fn venv_root(interpreter: &Path) -> Option<PathBuf> {
    if !is_venv_interpreter(interpreter) {
        return None;
    }
    interpreter.parent()?.parent().map(Path::to_path_buf)
}

/// Locate the checker executable. Returns `None` (never an error) when
/// nothing is found; callers treat that as "unavailable" and stop.
pub fn resolve_executable(
    project_root: &Path,
    explicit: Option<&Path>,
    interpreter: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(configured) = explicit.filter(|p| !p.as_os_str().is_empty()) {
        let path = if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            project_root.join(configured)
        };
        return Some(path);
    }
    match interpreter {
        Some(interp) if is_venv_interpreter(interp) => {
            let sibling = interp.parent()?.join(checker_executable_name());
            if sibling.is_file() {
                debug!(path = %sibling.display(), "checker found next to venv interpreter");
                Some(sibling)
            } else {
                None
            }
        }
        _ => match which::which(CHECKER_PACKAGE) {
            Ok(found) => {
                debug!(path = %found.display(), "checker found on PATH");
                Some(found)
            }
            Err(_) => None,
        },
    }
}

/// Build the environment for checker invocations: the current process
/// environment, caller overrides on top, and venv adjustments last.
pub fn build_env(
    interpreter: Option<&Path>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    if let Some(root) = interpreter.and_then(venv_root) {
        env.insert(ENV_VIRTUAL_ENV.to_string(), root.display().to_string());
        let bin = root.join(if cfg!(windows) { "Scripts" } else { "bin" });
        let search_path = match env.get(ENV_PATH) {
            Some(existing) => {
                let entries = std::iter::once(bin.clone()).chain(std::env::split_paths(existing));
                std::env::join_paths(entries)
                    .map(|joined| joined.to_string_lossy().to_string())
                    .unwrap_or_else(|_| existing.clone())
            }
            None => bin.display().to_string(),
        };
        env.insert(ENV_PATH.to_string(), search_path);
        env.remove(ENV_PYTHONHOME);
    }
    env
}

/// Validate the resolved executable with a `-V` invocation.
///
/// A non-zero exit or spawn failure means "unavailable", not a crash; the
/// outcome is logged so users can diagnose a broken install.
pub fn smoke_check(executable: &Path, env: &HashMap<String, String>) -> bool {
    let output = Command::new(executable)
        .arg("-V")
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.trim().is_empty() {
                warn!(exe = %executable.display(), %stderr, "checker version probe wrote to stderr");
            }
            if !out.status.success() {
                warn!(exe = %executable.display(), status = %out.status, "checker version probe failed");
            }
            out.status.success()
        }
        Err(err) => {
            warn!(exe = %executable.display(), %err, "could not spawn checker for version probe");
            false
        }
    }
}
