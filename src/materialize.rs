//! Buffer materialization: projecting source snapshots onto the
//! filesystem so the external checker can read them.
//!
//! Saved, unmodified sources are scanned in place. Dirty or virtual
//! buffers are written to a per-request temporary directory, each under
//! its own subdirectory and keeping its original file name (the checker
//! batching rules and module naming both key on the file name). The
//! directory (and every file in it) is removed when the workspace drops,
//! so cleanup runs on success, failure, cancellation, and unwind alike.

use crate::errors::ScanError;
use crate::models::{SourceFile, SourceId, SourceKind};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Directory created under the project root when the system temp location
/// is unusable (different filesystem root on Windows).
const PROJECT_TEMP_DIR: &str = ".tycheck.tmp";

#[derive(Debug)]
/// Filesystem projection of one source: either its real on-disk path or a
/// temp copy of the in-memory content. Exactly one path is authoritative.
pub struct ScannableFile {
    source: SourceId,
    path: PathBuf,
    temp: bool,
}

impl ScannableFile {
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// The path handed to the checker.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temp(&self) -> bool {
        self.temp
    }

    /// File name of the scan path, used by the batching rule.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
/// Scan-scoped workspace owning the temp files of one request.
pub struct ScanWorkspace {
    project_root: PathBuf,
    temp_dir: Option<TempDir>,
}

impl ScanWorkspace {
    pub fn new(project_root: PathBuf) -> Self {
        ScanWorkspace {
            project_root,
            temp_dir: None,
        }
    }

    /// Project each checkable source onto the filesystem.
    ///
    /// Non-checkable sources are silently dropped; the caller decides what
    /// an empty projection means (short-circuit, no scan).
    pub fn materialize(&mut self, sources: &[SourceFile]) -> Result<Vec<ScannableFile>, ScanError> {
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            if source.kind != SourceKind::Python {
                debug!(file = %source.display_name(), "skipping non-checkable source");
                continue;
            }
            let on_disk = source
                .path
                .as_ref()
                .filter(|p| !source.modified && p.is_file());
            let (path, temp) = match on_disk {
                Some(real) => (absolutize(real, &self.project_root), false),
                None => (self.write_temp(source)?, true),
            };
            files.push(ScannableFile {
                source: source.id,
                path,
                temp,
            });
        }
        Ok(files)
    }

    /// The temp directory backing this request, if any buffer needed one.
    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    fn write_temp(&mut self, source: &SourceFile) -> Result<PathBuf, ScanError> {
        if self.temp_dir.is_none() {
            self.temp_dir = Some(create_temp_dir(&self.project_root)?);
        }
        let dir = self.temp_dir.as_ref().expect("just created");
        let file_name = source
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("buffer.py"));
        // One subdirectory per source: two dirty `__init__.py` from
        // different packages must not collide.
        let subdir = dir.path().join(format!("s{}", source.id.0));
        std::fs::create_dir_all(&subdir).map_err(ScanError::Io)?;
        let path = subdir.join(file_name);
        std::fs::write(&path, source.content.as_bytes()).map_err(ScanError::Io)?;
        debug!(file = %source.display_name(), temp = %path.display(), "materialized dirty buffer");
        Ok(path)
    }
}

/// Pick where the request temp directory goes. The checker requires its
/// working directory and the target files to share a filesystem root on
/// Windows (drive letter), so a project-local location is used when the
/// system temp directory lives on a different root.
fn create_temp_dir(project_root: &Path) -> Result<TempDir, ScanError> {
    let system = std::env::temp_dir();
    if cfg!(windows) && !same_filesystem_root(&system, project_root) {
        let local = project_root.join(PROJECT_TEMP_DIR);
        std::fs::create_dir_all(&local).map_err(ScanError::Io)?;
        return TempDir::new_in(&local).map_err(ScanError::Io);
    }
    TempDir::new().map_err(ScanError::Io)
}

fn same_filesystem_root(a: &Path, b: &Path) -> bool {
    root_component(a) == root_component(b)
}

fn root_component(path: &Path) -> Option<String> {
    match path.components().next() {
        Some(Component::Prefix(prefix)) => {
            Some(prefix.as_os_str().to_string_lossy().to_ascii_lowercase())
        }
        Some(Component::RootDir) => Some("/".to_string()),
        _ => None,
    }
}

fn absolutize(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
