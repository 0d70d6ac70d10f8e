//! Shared data models: severity levels, parsed issues, routed problems,
//! and the per-request scan result.

pub mod source;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub use source::{SourceFile, SourceId, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
/// Closed severity enumeration, ordered for display: Error > Warning > Note.
pub enum SeverityLevel {
    Note,
    Warning,
    Error,
}

impl SeverityLevel {
    /// Case-insensitive mapping from a checker output token.
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim();
        if t.eq_ignore_ascii_case("error") {
            Some(SeverityLevel::Error)
        } else if t.eq_ignore_ascii_case("warning") {
            Some(SeverityLevel::Warning)
        } else if t.eq_ignore_ascii_case("note") {
            Some(SeverityLevel::Note)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Error => "error",
            SeverityLevel::Warning => "warning",
            SeverityLevel::Note => "note",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One diagnostic as parsed from checker output, addressed by the path
/// string the checker emitted (possibly relative, possibly a temp file).
pub struct Issue {
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub severity: SeverityLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// An issue resolved against a concrete source plus presentation metadata.
pub struct Problem {
    #[serde(skip)]
    pub source: SourceId,
    pub line: u32,
    pub column: u32,
    pub severity: SeverityLevel,
    pub message: String,
    /// Set when the reported column lies past the end of the line; the
    /// caller should anchor the annotation at end of line.
    pub after_end_of_line: bool,
    /// Carried through for callers that render suppressed errors
    /// differently; the core never sets it.
    pub suppress_errors: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
/// Severity counts plus the number of files covered by the scan.
pub struct ScanSummary {
    pub errors: usize,
    pub warnings: usize,
    pub notes: usize,
    pub files: usize,
}

#[derive(Debug, Clone, Default)]
/// Immutable outcome of one scan request: problems per source, in the
/// order the checker emitted them.
pub struct ScanResult {
    problems: BTreeMap<SourceId, Vec<Problem>>,
    files_scanned: usize,
}

impl ScanResult {
    pub fn new(files_scanned: usize) -> Self {
        ScanResult {
            problems: BTreeMap::new(),
            files_scanned,
        }
    }

    /// Register a scanned source so it appears in the result even with no
    /// findings (lets callers clear stale annotations).
    pub fn register(&mut self, source: SourceId) {
        self.problems.entry(source).or_default();
    }

    pub fn push(&mut self, problem: Problem) {
        self.problems.entry(problem.source).or_default().push(problem);
    }

    pub fn problems_for(&self, source: SourceId) -> &[Problem] {
        self.problems.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceId, &Vec<Problem>)> {
        self.problems.iter()
    }

    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }

    pub fn is_empty(&self) -> bool {
        self.problems.values().all(|v| v.is_empty())
    }

    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            files: self.files_scanned,
            ..ScanSummary::default()
        };
        for problem in self.problems.values().flatten() {
            match problem.severity {
                SeverityLevel::Error => summary.errors += 1,
                SeverityLevel::Warning => summary.warnings += 1,
                SeverityLevel::Note => summary.notes += 1,
            }
        }
        summary
    }
}
