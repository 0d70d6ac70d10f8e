//! Output rendering for scan results.
//!
//! Supports `human` (default) and `json` outputs. The JSON form includes
//! per-problem fields and a top-level summary.

use crate::models::{ScanResult, SeverityLevel, SourceFile, SourceId};
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::collections::HashMap;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Print scan results in the requested format.
pub fn print_scan(result: &ScanResult, sources: &[SourceFile], output: &str) {
    match output {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_scan_json(result, sources)).unwrap_or_default()
        ),
        _ => {
            let color = use_colors(output);
            let names = display_names(sources);
            for (source, problems) in result.iter() {
                let file = names
                    .get(source)
                    .cloned()
                    .unwrap_or_else(|| format!("<source {}>", source.0));
                for p in problems {
                    let sev = match p.severity {
                        SeverityLevel::Error => {
                            if color {
                                "⟦error⟧".red().bold().to_string()
                            } else {
                                "⟦error⟧".to_string()
                            }
                        }
                        SeverityLevel::Warning => {
                            if color {
                                "⟦warn⟧".yellow().bold().to_string()
                            } else {
                                "⟦warn⟧".to_string()
                            }
                        }
                        SeverityLevel::Note => {
                            if color {
                                "⟦note⟧".blue().bold().to_string()
                            } else {
                                "⟦note⟧".to_string()
                            }
                        }
                    };
                    let icon = match p.severity {
                        SeverityLevel::Error => "✖".red().to_string(),
                        SeverityLevel::Warning => "▲".yellow().to_string(),
                        SeverityLevel::Note => "◆".blue().to_string(),
                    };
                    let location = format!("{}:{}:{}", file, p.line, p.column);
                    let location = if color {
                        location.bold().to_string()
                    } else {
                        location
                    };
                    println!("{} {} {} — {}", icon, sev, location, p.message);
                }
            }
            let summary = result.summary();
            let line = format!(
                "— Summary — errors={} warnings={} notes={} files={}",
                summary.errors, summary.warnings, summary.notes, summary.files
            );
            if color {
                println!("{}", line.bold());
            } else {
                println!("{}", line);
            }
        }
    }
}

fn display_names(sources: &[SourceFile]) -> HashMap<SourceId, String> {
    sources
        .iter()
        .map(|s| (s.id, s.display_name()))
        .collect()
}

/// Compose scan JSON object (pure) for testing/snapshot purposes.
pub fn compose_scan_json(result: &ScanResult, sources: &[SourceFile]) -> JsonVal {
    let names = display_names(sources);
    let mut problems = Vec::new();
    for (source, list) in result.iter() {
        let file = names
            .get(source)
            .cloned()
            .unwrap_or_else(|| format!("<source {}>", source.0));
        for p in list {
            problems.push(json!({
                "file": file,
                "line": p.line,
                "column": p.column,
                "severity": p.severity.as_str(),
                "message": p.message,
                "afterEndOfLine": p.after_end_of_line,
            }));
        }
    }
    let summary = result.summary();
    json!({
        "problems": problems,
        "summary": {
            "errors": summary.errors,
            "warnings": summary.warnings,
            "notes": summary.notes,
            "files": summary.files,
        }
    })
}
