//! Source snapshots handed to the coordinator by the embedding caller.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Stable caller-assigned handle for one source unit.
pub struct SourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Classification used to drop non-checkable files before a scan.
pub enum SourceKind {
    Python,
    Other,
}

impl SourceKind {
    /// Classify by file extension; `.py` and `.pyi` are checkable.
    pub fn classify(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => SourceKind::Python,
            _ => SourceKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
/// Snapshot of an editor-visible source unit. The coordinator only reads
/// it; the caller keeps ownership of the live buffer.
pub struct SourceFile {
    pub id: SourceId,
    /// On-disk location, when the unit is backed by a file.
    pub path: Option<PathBuf>,
    /// Current buffer content. Authoritative when `modified` is set or the
    /// unit has no on-disk path.
    pub content: String,
    pub modified: bool,
    pub kind: SourceKind,
}

impl SourceFile {
    /// A saved, unmodified file whose disk content matches `content`.
    pub fn saved(id: SourceId, path: PathBuf, content: String) -> Self {
        let kind = SourceKind::classify(&path);
        SourceFile {
            id,
            path: Some(path),
            content,
            modified: false,
            kind,
        }
    }

    /// A file with unsaved modifications; `content` is the live buffer.
    pub fn dirty(id: SourceId, path: PathBuf, content: String) -> Self {
        let kind = SourceKind::classify(&path);
        SourceFile {
            id,
            path: Some(path),
            content,
            modified: true,
            kind,
        }
    }

    /// A buffer with no backing file. `name` is only used for display and
    /// temp-file naming, e.g. "scratch.py".
    pub fn virtual_buffer(id: SourceId, name: &str, content: String) -> Self {
        let kind = SourceKind::classify(Path::new(name));
        SourceFile {
            id,
            path: Some(PathBuf::from(name)),
            content,
            modified: true,
            kind,
        }
    }

    /// Human-readable identity for logs and printers.
    pub fn display_name(&self) -> String {
        match &self.path {
            Some(p) => p.to_string_lossy().to_string(),
            None => format!("<buffer {}>", self.id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(
            SourceKind::classify(Path::new("a/b/mod.py")),
            SourceKind::Python
        );
        assert_eq!(
            SourceKind::classify(Path::new("stub.pyi")),
            SourceKind::Python
        );
        assert_eq!(
            SourceKind::classify(Path::new("README.md")),
            SourceKind::Other
        );
        assert_eq!(SourceKind::classify(Path::new("noext")), SourceKind::Other);
    }

    #[test]
    fn test_saved_vs_dirty_flags() {
        let s = SourceFile::saved(SourceId(1), PathBuf::from("a.py"), "x = 1\n".into());
        assert!(!s.modified);
        let d = SourceFile::dirty(SourceId(2), PathBuf::from("a.py"), "x = 2\n".into());
        assert!(d.modified);
    }
}
