use anyhow::Result;
use std::path::Path;
use std::process::ExitCode;

use crate::report::{read_report, render_report, ContextPackReport, ReportStatus};

/// Human summary of a report, one line per entry.
pub fn format_summary(report: &ContextPackReport) -> Vec<String> {
    let status = match report.status {
        ReportStatus::Ok => "✅ ok",
        ReportStatus::CoreOverBudget => "⚠️  core-over-budget",
        ReportStatus::Error => "❌ error",
    };

    let mut lines = vec![
        "# Context pack".to_string(),
        String::new(),
        format!("- Status: {}", status),
        format!("- Repo root: {}", report.repo_root),
    ];
    if !report.base_commit.is_empty() {
        lines.push(format!(
            "- Range: {} ({}...{})",
            report.base_ref, report.base_commit, report.head_commit
        ));
    }
    lines.push(format!(
        "- Tokens: {} / {} (baseline {}, remaining {}, {})",
        report.tokens.final_tokens,
        report.budget,
        report.tokens.baseline,
        report.tokens.remaining,
        report.tokens.encoding
    ));
    lines.push(format!("- Changed files: {}", report.counts.changed));
    lines.push(format!(
        "- Related files: {} included of {} candidates ({} omitted)",
        report.counts.related_included,
        report.counts.related_candidates,
        report.counts.related_omitted
    ));
    lines.push(format!(
        "- Scribe targets: {} ({} failed, {} hit limits)",
        report.counts.scribe_targets,
        report.counts.scribe_failed_targets,
        report.counts.scribe_limit_signals
    ));
    if let Some(pack) = &report.paths.pack {
        lines.push(format!("- Pack: {}", pack));
    }
    if let Some(report_path) = &report.paths.report_path {
        lines.push(format!("- Report: {}", report_path));
    }

    if !report.warnings.is_empty() {
        lines.push(String::new());
        lines.push("## Warnings".to_string());
        lines.push(String::new());
        lines.extend(report.warnings.iter().map(|w| format!("- {}", w)));
    }

    if let Some(error) = &report.error {
        lines.push(String::new());
        lines.push(format!("Error ({}): {}", error.code, error.message));
        if let Some(details) = &error.details {
            lines.push(format!("  {}", details));
        }
    }

    lines
}

pub fn print_report(report: &ContextPackReport, json: bool) -> Result<()> {
    if json {
        print!("{}", render_report(report)?);
    } else {
        for line in format_summary(report) {
            println!("{}", line);
        }
    }
    Ok(())
}

pub fn run_report(file: &Path, json: bool) -> Result<ExitCode> {
    let report = read_report(file)?;
    print_report(&report, json)?;
    Ok(ExitCode::SUCCESS)
}
