//! Plain-text and TSV manifests written next to the pack.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::domain::{OmissionLedger, OmittedEntry, RankedRelatedCandidate};
use crate::error::PackError;
use crate::recall::RecallTargetRow;

use super::paths::OutputPaths;

pub const RELATED_SELECTION_HEADER: &str = "path\tfrequency\ttokens_estimate\tdecision\treason";
pub const SCRIBE_TARGETS_HEADER: &str =
    "target\tstatus\ttotal_paths\teligible_paths\tlimits_reached\tmax_depth_reached\tnote";

const WITHIN_BUDGET: &str = "within-budget";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDecision {
    Included,
    Omitted,
}

impl fmt::Display for SelectionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SelectionDecision::Included => "included",
            SelectionDecision::Omitted => "omitted",
        })
    }
}

/// One line of the related-selection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedSelectionRow {
    pub path: String,
    pub frequency: u32,
    pub tokens_estimate: Option<u64>,
    pub decision: SelectionDecision,
    pub reason: String,
}

/// Every ranked candidate plus every filtered-out related path, by path.
pub fn to_selection_rows(
    ranked: &[RankedRelatedCandidate],
    included: &HashSet<String>,
    omitted: &OmissionLedger,
) -> Vec<RelatedSelectionRow> {
    let mut rows: Vec<RelatedSelectionRow> = ranked
        .iter()
        .map(|candidate| {
            let is_included = included.contains(&candidate.path);
            RelatedSelectionRow {
                path: candidate.path.clone(),
                frequency: candidate.frequency,
                tokens_estimate: candidate.estimated_tokens,
                decision: if is_included {
                    SelectionDecision::Included
                } else {
                    SelectionDecision::Omitted
                },
                reason: if is_included {
                    WITHIN_BUDGET.to_string()
                } else {
                    omitted
                        .get(&candidate.path)
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "over-budget".to_string())
                },
            }
        })
        .collect();

    let ranked_paths: HashSet<&str> = ranked.iter().map(|c| c.path.as_str()).collect();
    rows.extend(
        omitted
            .iter()
            .filter(|(path, _)| !ranked_paths.contains(path))
            .map(|(path, reason)| RelatedSelectionRow {
                path: path.to_string(),
                frequency: 0,
                tokens_estimate: None,
                decision: SelectionDecision::Omitted,
                reason: reason.to_string(),
            }),
    );

    rows.sort_by(|l, r| l.path.cmp(&r.path));
    rows
}

pub fn format_omitted_entries(entries: &[OmittedEntry]) -> Vec<String> {
    let mut sorted: Vec<&OmittedEntry> = entries.iter().collect();
    sorted.sort_by(|l, r| l.path.cmp(&r.path));
    sorted
        .into_iter()
        .map(|entry| format!("{}\t{}", entry.path, entry.reason))
        .collect()
}

pub fn format_omission_ledger(ledger: &OmissionLedger) -> Vec<String> {
    ledger
        .iter()
        .map(|(path, reason)| format!("{}\t{}", path, reason))
        .collect()
}

pub fn format_selection_rows(rows: &[RelatedSelectionRow]) -> Vec<String> {
    std::iter::once(RELATED_SELECTION_HEADER.to_string())
        .chain(rows.iter().map(|row| {
            format!(
                "{}\t{}\t{}\t{}\t{}",
                row.path,
                row.frequency,
                row.tokens_estimate
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                row.decision,
                row.reason
            )
        }))
        .collect()
}

pub fn format_target_rows(rows: &[RecallTargetRow]) -> Vec<String> {
    std::iter::once(SCRIBE_TARGETS_HEADER.to_string())
        .chain(rows.iter().map(|row| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                row.target,
                row.status,
                row.total_paths,
                row.eligible_paths,
                row.limits_reached,
                row.max_depth_reached
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                row.note.as_deref().unwrap_or("")
            )
        }))
        .collect()
}

/// Lines joined by `\n` with a trailing newline; empty file for no lines.
pub async fn write_lines_file(path: &Path, lines: &[String]) -> Result<(), PackError> {
    let content = if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    };
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PackError::io(format!("write {}", path.display()), e))
}

/// Inputs for the full manifest set.
pub struct Manifests<'a> {
    pub changed_included: &'a [String],
    pub related_included: &'a [String],
    pub omitted_changed: &'a [OmittedEntry],
    pub omitted_related: &'a OmissionLedger,
    pub selection_rows: &'a [RelatedSelectionRow],
    pub target_rows: &'a [RecallTargetRow],
}

pub async fn write_manifests(paths: &OutputPaths, manifests: &Manifests<'_>) -> Result<(), PackError> {
    write_lines_file(&paths.changed_manifest, manifests.changed_included).await?;
    write_lines_file(&paths.related_manifest, manifests.related_included).await?;
    write_lines_file(
        &paths.omitted_manifest,
        &format_omitted_entries(manifests.omitted_changed),
    )
    .await?;
    write_lines_file(
        &paths.related_omitted_manifest,
        &format_omission_ledger(manifests.omitted_related),
    )
    .await?;
    write_lines_file(
        &paths.related_selection_manifest,
        &format_selection_rows(manifests.selection_rows),
    )
    .await?;
    write_lines_file(
        &paths.scribe_targets_manifest,
        &format_target_rows(manifests.target_rows),
    )
    .await
}
