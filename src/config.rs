//! Configuration discovery and effective settings resolution.
//!
//! Tycheck reads `tycheck.toml|yaml|yml` from the project root (or closest
//! ancestor) and merges it with CLI flags to produce an `Effective` config.
//! Defaults:
//! - `include`: `**/*.py` plus `**/*.pyi`
//! - `exclude`: empty
//! - `output`: `human`
//! - `mypy_path` / `config_file` / `interpreter` / `arguments`: unset
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::coordinator::ScanSettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_BASENAME: &str = "tycheck";

#[derive(Debug, Default, Deserialize, Clone)]
/// Checker-related configuration section under `[checker]`.
pub struct CheckerCfg {
    /// Explicit path to the checker executable.
    pub path: Option<String>,
    /// Checker config file (e.g. `mypy.ini`), relative to the project root.
    #[serde(rename = "configFile")]
    pub config_file: Option<String>,
    /// Extra arguments passed verbatim to every invocation.
    pub arguments: Option<String>,
    /// Python interpreter used for virtual-environment detection.
    pub interpreter: Option<String>,
    /// Environment variables layered over the process environment.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    /// Probe the checker with `-V` before every scan.
    pub precheck: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `tycheck.toml|yaml`.
pub struct TycheckConfig {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub output: Option<String>,
    pub checker: Option<CheckerCfg>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub project_root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub output: String,
    pub mypy_path: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub arguments: String,
    pub interpreter: Option<PathBuf>,
    pub env_overrides: HashMap<String, String>,
    pub precheck: bool,
}

impl Effective {
    /// Project the resolved configuration into coordinator settings.
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            project_root: self.project_root.clone(),
            mypy_path: self.mypy_path.clone(),
            config_file: self.config_file.clone(),
            arguments: self.arguments.clone(),
            interpreter: self.interpreter.clone(),
            env_overrides: self.env_overrides.clone(),
            precheck: self.precheck,
        }
    }
}

/// Walk upward from `start` to detect the project root.
///
/// Stops when a `tycheck.toml|yaml|yml` or a `.git` directory is found.
pub fn detect_project_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if cur.join(format!("{CONFIG_BASENAME}.toml")).exists()
            || cur.join(format!("{CONFIG_BASENAME}.yaml")).exists()
            || cur.join(format!("{CONFIG_BASENAME}.yml")).exists()
        {
            return cur.to_path_buf();
        }
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `TycheckConfig` from `tycheck.toml` or `tycheck.yaml|yml` if present.
pub fn load_config(root: &Path) -> Option<TycheckConfig> {
    let toml_path = root.join(format!("{CONFIG_BASENAME}.toml"));
    if toml_path.exists() {
        let s = fs::read_to_string(&toml_path).ok()?;
        let cfg: TycheckConfig = toml::from_str(&s).ok()?;
        return Some(cfg);
    }
    for yml in [
        format!("{CONFIG_BASENAME}.yaml"),
        format!("{CONFIG_BASENAME}.yml"),
    ] {
        let p = root.join(yml);
        if p.exists() {
            let s = fs::read_to_string(&p).ok()?;
            let cfg: TycheckConfig = serde_yaml::from_str(&s).ok()?;
            return Some(cfg);
        }
    }
    None
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(
    cli_project_root: Option<&str>,
    cli_mypy_path: Option<&str>,
    cli_config_file: Option<&str>,
    cli_arguments: Option<&str>,
    cli_interpreter: Option<&str>,
    cli_output: Option<&str>,
    cli_precheck: Option<bool>,
) -> Effective {
    let start = PathBuf::from(cli_project_root.unwrap_or("."));
    let project_root = detect_project_root(&start);
    let cfg = load_config(&project_root).unwrap_or_default();
    let checker = cfg.checker.unwrap_or_default();

    let include = cfg
        .include
        .unwrap_or_else(|| vec!["**/*.py".to_string(), "**/*.pyi".to_string()]);
    let exclude = cfg.exclude.unwrap_or_default();

    let output = cli_output
        .map(|s| s.to_string())
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());

    let mypy_path = cli_mypy_path
        .map(|s| s.to_string())
        .or(checker.path)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let config_file = cli_config_file
        .map(|s| s.to_string())
        .or(checker.config_file)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let arguments = cli_arguments
        .map(|s| s.to_string())
        .or(checker.arguments)
        .unwrap_or_default();

    let interpreter = cli_interpreter
        .map(|s| s.to_string())
        .or(checker.interpreter)
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    Effective {
        project_root,
        include,
        exclude,
        output,
        mypy_path,
        config_file,
        arguments,
        interpreter,
        env_overrides: checker.env.unwrap_or_default(),
        precheck: cli_precheck.or(checker.precheck).unwrap_or(false),
    }
}
