//! Report and manifest emission.
//!
//! The JSON report is the machine-checkable record of a run; the manifests
//! are line-oriented views of the same decisions for humans and scripts.

mod manifest;
mod paths;
mod types;

pub use manifest::{
    format_selection_rows, format_target_rows, to_selection_rows, write_lines_file,
    write_manifests, Manifests, RelatedSelectionRow, SelectionDecision,
    RELATED_SELECTION_HEADER, SCRIBE_TARGETS_HEADER,
};
pub use paths::{
    output_base_name, output_extension, sanitize_repo_slug, validate_output_name, OutputPaths,
};
pub use types::{
    ContextPackReport, CountSummary, ReportError, ReportErrorCode, ReportPaths, ReportStatus,
    timestamp, TokenSummary, REPORT_VERSION,
};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::error::PackError;

/// Shape check a reader runs before trusting a report.
pub fn is_report_v1(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    let is_string = |key: &str| object.get(key).is_some_and(Value::is_string);

    object.get("version").and_then(Value::as_u64) == Some(u64::from(REPORT_VERSION))
        && [
            "generatedAt",
            "status",
            "projectDir",
            "repoRoot",
            "baseRef",
            "baseCommit",
            "headCommit",
        ]
        .into_iter()
        .all(is_string)
        && object.get("budget").is_some_and(Value::is_number)
}

/// Serialize with 4-space indentation and a trailing newline.
pub fn render_report(report: &ContextPackReport) -> Result<String, PackError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    report
        .serialize(&mut serializer)
        .map_err(|e| PackError::Other(format!("Failed to serialize report: {}", e)))?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| PackError::Other(format!("Report is not UTF-8: {}", e)))
}

pub async fn write_report(path: &Path, report: &ContextPackReport) -> Result<(), PackError> {
    let content = render_report(report)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PackError::io(format!("write {}", path.display()), e))
}

/// Read a persisted report, refusing anything that is not version 1.
pub fn read_report(path: &Path) -> Result<ContextPackReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report from {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse report from {}", path.display()))?;

    if !is_report_v1(&value) {
        bail!("{} is not a version {} context pack report", path.display(), REPORT_VERSION);
    }

    serde_json::from_value(value)
        .with_context(|| format!("Unexpected report shape in {}", path.display()))
}
