//! Pack build outcome.

use std::path::PathBuf;

use crate::report::{ContextPackReport, OutputPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Header and changed files alone exceed the budget.
    CoreOverBudget,
    Error,
}

/// What a run produced. Both arms carry the persisted report.
#[derive(Debug, Clone)]
pub enum ContextPackBuildResult {
    Success {
        pack_path: PathBuf,
        paths: OutputPaths,
        report: ContextPackReport,
    },
    Failure {
        reason: FailureReason,
        report: ContextPackReport,
    },
}

impl ContextPackBuildResult {
    pub fn report(&self) -> &ContextPackReport {
        match self {
            ContextPackBuildResult::Success { report, .. } => report,
            ContextPackBuildResult::Failure { report, .. } => report,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ContextPackBuildResult::Success { .. })
    }
}
