//! Markdown rendering of the context pack.

use crate::domain::OmittedEntry;
use crate::recall::{RecallTargetRow, RecallTargetStatus};

/// A file and its full current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

impl FileBlock {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything the header section is built from.
#[derive(Debug, Clone)]
pub struct HeaderInfo<'a> {
    pub generated_at: &'a str,
    pub repo_root: &'a str,
    pub project_dir: &'a str,
    pub base_ref: &'a str,
    pub base_commit: &'a str,
    pub head_commit: &'a str,
    pub budget: u64,
    pub name_status_text: &'a str,
    pub diff_text: &'a str,
    pub recall_targets: &'a [RecallTargetRow],
    pub pr_description: Option<&'a str>,
}

pub fn build_header_lines(info: &HeaderInfo<'_>) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    if let Some(section) = info.pr_description {
        lines.extend(section.lines().map(str::to_string));
    }

    let queried = info
        .recall_targets
        .iter()
        .filter(|row| row.status == RecallTargetStatus::Ok)
        .count();

    lines.push(format!("- Generated: {}", info.generated_at));
    lines.push(format!("- Repo root: {}", info.repo_root));
    lines.push(format!("- Working dir: {}", info.project_dir));
    lines.push(format!("- Base ref: {}", info.base_ref));
    lines.push(format!("- Base commit: {}", info.base_commit));
    lines.push(format!("- Head commit: {}", info.head_commit));
    lines.push(format!(
        "- Scribe targets queried: {}/{}",
        queried,
        info.recall_targets.len()
    ));
    lines.push(format!("- Token budget: {}", info.budget));
    lines.push(String::new());

    lines.push("## Changed files (git name-status)".to_string());
    lines.push(String::new());
    lines.push("```text".to_string());
    lines.push(info.name_status_text.trim_end().to_string());
    lines.push("```".to_string());
    lines.push(String::new());

    lines.push(format!(
        "## Git diff ({}...{})",
        info.base_commit, info.head_commit
    ));
    lines.push(String::new());
    lines.push("```diff".to_string());
    lines.push(info.diff_text.trim_end().to_string());
    lines.push("```".to_string());
    lines.push(String::new());

    lines
}

/// `### path` followed by the content in a bare fence.
pub fn render_file_block(file: &FileBlock) -> String {
    let mut out = format!("### {}\n\n```\n{}", file.path, file.content);
    if !file.content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
    out
}

fn render_file_section(title: &str, files: &[FileBlock]) -> String {
    let mut parts = vec![title.to_string(), String::new()];
    parts.extend(files.iter().map(render_file_block));
    if files.is_empty() {
        parts.push("None".to_string());
        parts.push(String::new());
    }
    parts.join("\n")
}

pub struct PackDocument<'a> {
    pub header_lines: &'a [String],
    pub changed_files: &'a [FileBlock],
    pub related_files: &'a [FileBlock],
    pub omitted_changed_files: &'a [OmittedEntry],
}

pub fn render_context_pack(doc: &PackDocument<'_>) -> String {
    let mut lines: Vec<String> = vec!["# PR Context Pack".to_string(), String::new()];
    lines.extend(doc.header_lines.iter().cloned());
    lines.push(String::new());

    lines.push(render_file_section(
        &format!(
            "## Full current code: changed files ({})",
            doc.changed_files.len()
        ),
        doc.changed_files,
    ));
    lines.push(render_file_section(
        &format!(
            "## Full current code: related files ({})",
            doc.related_files.len()
        ),
        doc.related_files,
    ));

    lines.push(format!(
        "## Omitted changed files ({})",
        doc.omitted_changed_files.len()
    ));
    lines.push(String::new());
    if doc.omitted_changed_files.is_empty() {
        lines.push("None".to_string());
    } else {
        for omitted in doc.omitted_changed_files {
            lines.push(format!("- {} \u{2014} {}", omitted.path, omitted.reason));
        }
    }
    lines.push(String::new());

    lines.join("\n")
}
