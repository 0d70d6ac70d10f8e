//! Error taxonomy for the scan pipeline.
//!
//! Parse-level anomalies never surface here; a malformed output line is
//! dropped by the parser. Everything that aborts a scan request flows
//! through `ScanError` so the coordinator can report it exactly once.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
/// Failure modes of a single scan request.
pub enum ScanError {
    /// The checker executable could not be located or failed validation.
    #[error("type checker executable not found (set mypy_path or install mypy)")]
    Unavailable,
    /// A user-supplied setting is invalid, e.g. a missing config file.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The checker process could not be spawned at all.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    /// I/O failure while reading checker output mid-scan.
    #[error("i/o failure while reading checker output: {0}")]
    Io(#[from] io::Error),
    /// The request was cancelled; never reported to the user as an error.
    #[error("scan interrupted")]
    Interrupted,
    /// Caught panic or broken internal invariant, surfaced as a generic
    /// tool failure instead of crashing the host.
    #[error("unexpected scan failure: {0}")]
    Internal(String),
}

impl ScanError {
    /// True for cancellation-style failures that must stay silent.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ScanError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_a_reportable_error() {
        assert!(ScanError::Interrupted.is_cancellation());
        assert!(!ScanError::Unavailable.is_cancellation());
        assert!(!ScanError::Config("x".into()).is_cancellation());
    }
}
