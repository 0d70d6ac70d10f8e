//! Checker process invocation: command construction, special-case
//! batching, spawning, and output capture.
//!
//! Batching rule: `__init__.py`, `__main__.py`, and `setup.py` each get
//! their own invocation; mixing them with other files makes the checker
//! resolve imports incorrectly (mypy#4008). All remaining targets share a
//! single trailing invocation, so one scan request may run zero, one, or
//! many checker processes whose outputs are merged in invocation order.

use crate::errors::ScanError;
use crate::materialize::ScannableFile;
use crate::models::Issue;
use crate::parse::parse_output;
use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// File names the checker cannot scan alongside other targets.
pub const SPECIAL_CASE_FILES: [&str; 3] = ["__init__.py", "__main__.py", "setup.py"];

pub fn is_special_case(file_name: &str) -> bool {
    SPECIAL_CASE_FILES.contains(&file_name)
}

/// Split targets into per-process partitions: one singleton per
/// special-case file (in target order), then one batch with the rest.
pub fn partition_targets(files: &[ScannableFile]) -> Vec<Vec<&ScannableFile>> {
    let mut partitions: Vec<Vec<&ScannableFile>> = Vec::new();
    let mut batch: Vec<&ScannableFile> = Vec::new();
    for file in files {
        if is_special_case(file.file_name()) {
            partitions.push(vec![file]);
        } else {
            batch.push(file);
        }
    }
    if !batch.is_empty() {
        partitions.push(batch);
    }
    partitions
}

/// Tokenize a free-form user argument string, honoring single and double
/// quotes and backslash escapes outside single quotes.
pub fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            // Only '\'' and '"' are ever stored; this arm is the
            // double-quote case.
            Some(_) => match c {
                '"' => quote = None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(c),
            },
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_token = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_token {
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        args.push(current);
    }
    args
}

#[derive(Debug, Clone)]
/// One fully-described checker process call.
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: PathBuf,
}

/// Build the command line for one partition:
/// `<exe> --show-column-numbers --follow-imports silent
/// [--config-file <path>] [<extra>...] <file>...`
pub fn build_invocation(
    executable: &Path,
    config_file: Option<&Path>,
    extra_arguments: &str,
    files: &[&ScannableFile],
    env: HashMap<String, String>,
    workdir: &Path,
) -> Invocation {
    let mut args = vec![
        "--show-column-numbers".to_string(),
        "--follow-imports".to_string(),
        "silent".to_string(),
    ];
    if let Some(config) = config_file {
        args.push("--config-file".to_string());
        args.push(config.to_string_lossy().to_string());
    }
    args.extend(split_arguments(extra_arguments));
    for file in files {
        args.push(file.path().to_string_lossy().to_string());
    }
    Invocation {
        program: executable.to_path_buf(),
        args,
        env,
        workdir: workdir.to_path_buf(),
    }
}

impl Invocation {
    /// Loggable rendition of the full command.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A spawned checker whose stdout is being consumed by the caller and
/// whose stderr drains on a side thread (so neither pipe can stall the
/// process). The child handle is shared so a cancelling thread can kill
/// it while the reader is blocked.
pub struct RunningChecker {
    child: Arc<Mutex<Child>>,
    stdout: ChildStdout,
    stderr_drain: JoinHandle<String>,
    command_line: String,
}

/// Spawn one invocation. A spawn failure is fatal for the request.
pub fn spawn(invocation: &Invocation) -> Result<RunningChecker, ScanError> {
    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .env_clear()
        .envs(&invocation.env)
        .current_dir(&invocation.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ScanError::Launch {
            program: invocation.program.to_string_lossy().to_string(),
            source,
        })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ScanError::Internal("checker stdout was not captured".into()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ScanError::Internal("checker stderr was not captured".into()))?;
    let stderr_drain = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });
    Ok(RunningChecker {
        child: Arc::new(Mutex::new(child)),
        stdout,
        stderr_drain,
        command_line: invocation.command_line(),
    })
}

impl RunningChecker {
    /// Shared handle a cancelling thread can use to kill the process.
    pub fn kill_handle(&self) -> Arc<Mutex<Child>> {
        Arc::clone(&self.child)
    }

    /// Read stdout to the end, parse it, and reap the process.
    ///
    /// A non-zero exit with well-formed diagnostics is the normal "found
    /// problems" outcome; the status is logged, not raised. stderr is log
    /// noise, never parsed for issues.
    pub fn collect(mut self) -> Result<Vec<Issue>, ScanError> {
        let issues = parse_output(BufReader::new(&mut self.stdout))?;
        let status = {
            let mut child = self
                .child
                .lock()
                .map_err(|_| ScanError::Internal("checker handle poisoned".into()))?;
            child.wait().map_err(ScanError::Io)?
        };
        let stderr = self.stderr_drain.join().unwrap_or_default();
        if !stderr.trim().is_empty() {
            warn!(command = %self.command_line, stderr = %stderr.trim(), "checker wrote to stderr");
        }
        if !status.success() {
            debug!(command = %self.command_line, %status, "checker exited non-zero");
        }
        Ok(issues)
    }
}
