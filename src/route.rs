//! Routing parsed issues back to the sources that produced them.
//!
//! The checker reports paths as it saw them (possibly relative to the
//! working directory, possibly temp copies of dirty buffers). Matching is
//! by resolved absolute path, so temp-backed issues land on the original
//! source, not the temp-file identity. Issues pointing outside the target
//! set are dropped; the checker can report on imported dependencies even
//! with import following silenced.

use crate::materialize::ScannableFile;
use crate::models::{Issue, Problem, ScanResult, SourceFile, SourceId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Messages the checker emits when scanning a file mid-edit; recurring
/// partial-parse noise that is filtered out before surfacing.
pub const INVALID_SYNTAX_SENTINEL: &str = "invalid syntax";

/// Resolve issues against the scanned targets, producing per-source
/// problem lists in checker emission order.
pub fn route_issues(
    issues: Vec<Issue>,
    scanned: &[ScannableFile],
    sources: &[SourceFile],
    project_root: &Path,
) -> ScanResult {
    let mut by_path: HashMap<PathBuf, SourceId> = HashMap::new();
    for file in scanned {
        by_path.insert(resolve(file.path(), project_root), file.source());
    }
    let by_id: HashMap<SourceId, &SourceFile> =
        sources.iter().map(|s| (s.id, s)).collect();

    let mut result = ScanResult::new(scanned.len());
    for file in scanned {
        result.register(file.source());
    }

    for issue in issues {
        if issue.message == INVALID_SYNTAX_SENTINEL {
            continue;
        }
        let key = resolve(Path::new(&issue.path), project_root);
        let Some(&source_id) = by_path.get(&key) else {
            debug!(path = %issue.path, "dropping issue for a path outside the target set");
            continue;
        };
        let (column, after_end_of_line) = match by_id.get(&source_id) {
            Some(source) => anchor_column(&source.content, issue.line, issue.column),
            None => (issue.column, false),
        };
        result.push(Problem {
            source: source_id,
            line: issue.line,
            column,
            severity: issue.severity,
            message: issue.message,
            after_end_of_line,
            suppress_errors: false,
        });
    }
    result
}

/// Resolve a checker-emitted path to a canonical absolute key. Falls back
/// to the lexically absolutized path when canonicalization fails (e.g.
/// the file disappeared between scan and routing).
fn resolve(path: &Path, project_root: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    absolute.canonicalize().unwrap_or(absolute)
}

/// Clamp a reported column to the line it targets. A column past the end
/// of the line (the checker anchoring a message to a logical line end)
/// maps to the last character with `after_end_of_line` set.
fn anchor_column(content: &str, line: u32, column: u32) -> (u32, bool) {
    let Some(text) = content.lines().nth(line.saturating_sub(1) as usize) else {
        return (column, true);
    };
    let len = text.chars().count() as u32;
    if column > len {
        (len.max(1), true)
    } else {
        (column, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::ScanWorkspace;
    use crate::models::SeverityLevel;
    use tempfile::tempdir;

    fn issue(path: &str, line: u32, column: u32, message: &str) -> Issue {
        Issue {
            path: path.into(),
            line,
            column,
            severity: SeverityLevel::Error,
            message: message.into(),
        }
    }

    #[test]
    fn test_relative_path_attribution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mod.py");
        std::fs::write(&path, "x: int = \"s\"\n").unwrap();
        let sources = vec![SourceFile::saved(
            SourceId(1),
            path,
            "x: int = \"s\"\n".into(),
        )];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();

        let result = route_issues(
            vec![issue("mod.py", 1, 10, "Incompatible types")],
            &scanned,
            &sources,
            dir.path(),
        );
        let problems = result.problems_for(SourceId(1));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].line, 1);
        assert_eq!(problems[0].column, 10);
        assert!(!problems[0].after_end_of_line);
    }

    #[test]
    fn test_temp_path_maps_back_to_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dirty.py");
        std::fs::write(&path, "old\n").unwrap();
        let sources = vec![SourceFile::dirty(
            SourceId(9),
            path,
            "value: int = []\n".into(),
        )];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();
        assert!(scanned[0].is_temp());

        let temp_path = scanned[0].path().to_string_lossy().to_string();
        let result = route_issues(
            vec![issue(&temp_path, 1, 14, "List item has wrong type")],
            &scanned,
            &sources,
            dir.path(),
        );
        let problems = result.problems_for(SourceId(9));
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn test_unmatched_paths_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "x = 1\n").unwrap();
        let sources = vec![SourceFile::saved(SourceId(1), path, "x = 1\n".into())];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();

        let result = route_issues(
            vec![issue("site-packages/other.py", 3, 1, "imported noise")],
            &scanned,
            &sources,
            dir.path(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_invalid_syntax_sentinel_is_filtered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def f(:\n").unwrap();
        let sources = vec![SourceFile::saved(SourceId(1), path, "def f(:\n".into())];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();

        let result = route_issues(
            vec![
                issue("a.py", 1, 7, INVALID_SYNTAX_SENTINEL),
                issue("a.py", 1, 1, "Function is missing a return type annotation"),
            ],
            &scanned,
            &sources,
            dir.path(),
        );
        let problems = result.problems_for(SourceId(1));
        assert_eq!(problems.len(), 1);
        assert_ne!(problems[0].message, INVALID_SYNTAX_SENTINEL);
    }

    #[test]
    fn test_column_past_line_end_anchors_after_end_of_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.py");
        let content = "x = f()\n";
        std::fs::write(&path, content).unwrap();
        let sources = vec![SourceFile::saved(SourceId(1), path, content.into())];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();

        let result = route_issues(
            vec![issue("short.py", 1, 40, "trailing anchor")],
            &scanned,
            &sources,
            dir.path(),
        );
        let problems = result.problems_for(SourceId(1));
        assert!(problems[0].after_end_of_line);
        assert_eq!(problems[0].column, 7);
    }

    #[test]
    fn test_all_scanned_sources_registered_even_when_clean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clean.py");
        std::fs::write(&path, "x = 1\n").unwrap();
        let sources = vec![SourceFile::saved(SourceId(4), path, "x = 1\n".into())];
        let mut ws = ScanWorkspace::new(dir.path().to_path_buf());
        let scanned = ws.materialize(&sources).unwrap();

        let result = route_issues(vec![], &scanned, &sources, dir.path());
        assert_eq!(result.files_scanned(), 1);
        assert!(result.problems_for(SourceId(4)).is_empty());
        assert_eq!(result.iter().count(), 1);
    }
}
