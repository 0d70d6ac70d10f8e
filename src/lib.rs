//! Tycheck core library.
//!
//! This crate exposes programmatic APIs for coordinating scans of Python
//! sources with an external type checker (mypy), parsing its diagnostics,
//! and routing them back to the originating sources.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `coordinator`: Scan request lifecycle, cancellation, and events.
//! - `environment`: Checker discovery and process environment (venv-aware).
//! - `errors`: The scan error taxonomy.
//! - `invoke`: Command construction, special-case batching, process capture.
//! - `materialize`: Projecting dirty buffers onto temp files for the scan.
//! - `models`: Data models for sources, severities, issues, and results.
//! - `output`: Human/JSON printers for scan results.
//! - `parse`: The checker's textual diagnostic grammar.
//! - `route`: Attribution of parsed issues to scanned sources.
//!
//! Note: All documentation comments are written in English by convention.
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod environment;
pub mod errors;
pub mod invoke;
pub mod materialize;
pub mod models;
pub mod output;
pub mod parse;
pub mod route;
