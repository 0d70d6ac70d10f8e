//! Line-oriented diagnostic parsing for mypy-style checker output.
//!
//! A candidate line is `<path>:<line>?:<column>?: <severity>: <message>`
//! where `<path>` contains no whitespace or ':' and line/column are
//! optional. Messages may contain further colons and even severity-like
//! tokens; the split point is the first ` <severity>:` occurrence, which
//! the anchored pattern below guarantees because everything before it can
//! only be the location prefix. Non-matching lines (summaries, blanks,
//! stray stderr noise) are skipped, never fatal.

use crate::models::{Issue, SeverityLevel};
use regex::Regex;
use std::io::{self, BufRead};
use std::sync::OnceLock;

fn issue_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^\s:]+):(?:(\d+):)?(?:(\d+):)? (?i)(error|warning|note):(.*)$")
            .expect("issue pattern is valid")
    })
}

/// Parse an entire checker output stream into issues.
///
/// Consumes the stream to the end; later lines are independent
/// diagnostics. Fails only on stream I/O errors. Lines with an
/// unrecognized severity token or an out-of-range position are dropped
/// individually. Missing line/column default to 1. Columns are used as
/// reported, with no off-by-one adjustment.
pub fn parse_output(reader: impl BufRead) -> io::Result<Vec<Issue>> {
    let pattern = issue_pattern();
    let mut issues = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let Some(caps) = pattern.captures(&line) else {
            continue;
        };
        let Some(severity) = SeverityLevel::from_token(&caps[4]) else {
            continue;
        };
        let line_no = match caps.get(2) {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(n) => n,
                Err(_) => continue,
            },
            None => 1,
        };
        let column = match caps.get(3) {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(n) => n,
                Err(_) => continue,
            },
            None => 1,
        };
        issues.push(Issue {
            path: caps[1].to_string(),
            line: line_no,
            column,
            severity,
            message: caps[5].trim().to_string(),
        });
    }
    Ok(issues)
}
