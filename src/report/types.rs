//! Versioned report schema.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::config::ContextPackOptions;
use crate::error::PackError;
use crate::git::RepoContext;
use crate::recall::{RecallTargetRow, RecallTargetStatus};
use crate::tokens::TOKEN_ENCODING;

use super::paths::OutputPaths;

/// Readers must check this before trusting the report shape.
pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Ok,
    CoreOverBudget,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportErrorCode {
    CoreOverBudget,
    ScribeFailure,
    GitError,
    TokenError,
    Unknown,
}

impl ReportErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportErrorCode::CoreOverBudget => "core-over-budget",
            ReportErrorCode::ScribeFailure => "scribe-failure",
            ReportErrorCode::GitError => "git-error",
            ReportErrorCode::TokenError => "token-error",
            ReportErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ReportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub baseline: u64,
    #[serde(rename = "final")]
    pub final_tokens: u64,
    /// `budget - final`; negative when the core alone is over budget.
    pub remaining: i64,
    pub encoding: String,
}

fn signed(tokens: u64) -> i64 {
    i64::try_from(tokens).unwrap_or(i64::MAX)
}

impl TokenSummary {
    pub fn new(baseline: u64, final_tokens: u64, budget: u64) -> Self {
        Self {
            baseline,
            final_tokens,
            remaining: signed(budget).saturating_sub(signed(final_tokens)),
            encoding: TOKEN_ENCODING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountSummary {
    pub changed: usize,
    pub related_candidates: usize,
    pub related_included: usize,
    pub related_omitted: usize,
    pub scribe_targets: usize,
    pub scribe_failed_targets: usize,
    pub scribe_limit_signals: usize,
}

impl CountSummary {
    pub fn new(
        changed: usize,
        related_candidates: usize,
        related_included: usize,
        related_omitted: usize,
        targets: &[RecallTargetRow],
    ) -> Self {
        Self {
            changed,
            related_candidates,
            related_included,
            related_omitted,
            scribe_targets: targets.len(),
            scribe_failed_targets: targets
                .iter()
                .filter(|row| row.status == RecallTargetStatus::Failed)
                .count(),
            scribe_limit_signals: targets.iter().filter(|row| row.limits_reached).count(),
        }
    }
}

/// Artifact locations. Every field is optional so error reports can carry
/// whatever was resolved before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omitted_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_omitted_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_selection_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scribe_targets_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

fn display(path: &Path) -> Option<String> {
    Some(path.display().to_string())
}

impl From<&OutputPaths> for ReportPaths {
    fn from(paths: &OutputPaths) -> Self {
        Self {
            output_dir: display(&paths.output_dir),
            pack: display(&paths.pack),
            changed_manifest: display(&paths.changed_manifest),
            related_manifest: display(&paths.related_manifest),
            omitted_manifest: display(&paths.omitted_manifest),
            related_omitted_manifest: display(&paths.related_omitted_manifest),
            related_selection_manifest: display(&paths.related_selection_manifest),
            scribe_targets_manifest: display(&paths.scribe_targets_manifest),
            report_path: display(&paths.report_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    pub code: ReportErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&PackError> for ReportError {
    fn from(err: &PackError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// The persisted decision record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPackReport {
    pub version: u32,
    pub generated_at: String,
    pub status: ReportStatus,
    pub project_dir: String,
    pub repo_root: String,
    pub base_ref: String,
    pub base_commit: String,
    pub head_commit: String,
    pub budget: u64,
    pub tokens: TokenSummary,
    pub counts: CountSummary,
    #[serde(default)]
    pub paths: ReportPaths,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ContextPackReport {
    /// A report for a run that got as far as resolving the repository.
    pub fn for_run(status: ReportStatus, context: &RepoContext, budget: u64) -> Self {
        Self {
            version: REPORT_VERSION,
            generated_at: timestamp(Utc::now()),
            status,
            project_dir: context.project_dir.display().to_string(),
            repo_root: context.repo_root.display().to_string(),
            base_ref: context.base_ref.clone(),
            base_commit: context.base_commit.clone(),
            head_commit: context.head_commit.clone(),
            budget,
            tokens: TokenSummary::new(0, 0, budget),
            counts: CountSummary::default(),
            paths: ReportPaths::default(),
            warnings: Vec::new(),
            error: None,
        }
    }

    /// An `error` report synthesized from the options alone.
    pub fn for_error(options: &ContextPackOptions, err: &PackError) -> Self {
        let project_dir = options.project_dir.display().to_string();
        Self {
            version: REPORT_VERSION,
            generated_at: timestamp(Utc::now()),
            status: ReportStatus::Error,
            repo_root: project_dir.clone(),
            project_dir,
            base_ref: options.base_ref.clone().unwrap_or_default(),
            base_commit: String::new(),
            head_commit: String::new(),
            budget: options.budget,
            tokens: TokenSummary::new(0, 0, options.budget),
            counts: CountSummary::default(),
            paths: ReportPaths::default(),
            warnings: Vec::new(),
            error: Some(ReportError::from(err)),
        }
    }

    pub fn with_tokens(mut self, tokens: TokenSummary) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_counts(mut self, counts: CountSummary) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_paths(mut self, paths: ReportPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_error(mut self, err: &PackError) -> Self {
        self.error = Some(ReportError::from(err));
        self
    }
}
