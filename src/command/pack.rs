use anyhow::Result;
use std::process::ExitCode;

use crate::cli::{self, PackArgs};
use crate::pack::{build_context_pack, Collaborators, ContextPackBuildResult, FailureReason};

use super::report::print_report;

pub async fn run_pack(args: PackArgs) -> Result<ExitCode> {
    let project_dir = cli::resolve_project_dir(args.project.clone())?;
    let options = args.to_options(project_dir);

    let collaborators = Collaborators::system(&options.tools);
    let result = build_context_pack(&options, &collaborators).await;

    print_report(result.report(), args.json)?;
    Ok(exit_code(&result, options.fail_over_budget))
}

/// Errors always fail; core-over-budget only when asked to.
fn exits_with_failure(result: &ContextPackBuildResult, fail_over_budget: bool) -> bool {
    if result.is_success() {
        return false;
    }
    match result {
        ContextPackBuildResult::Failure {
            reason: FailureReason::CoreOverBudget,
            ..
        } => fail_over_budget,
        _ => true,
    }
}

pub fn exit_code(result: &ContextPackBuildResult, fail_over_budget: bool) -> ExitCode {
    if exits_with_failure(result, fail_over_budget) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextPackOptions;
    use crate::error::PackError;
    use crate::git::RepoContext;
    use crate::report::{ContextPackReport, OutputPaths, ReportStatus};
    use std::path::{Path, PathBuf};

    fn failure(reason: FailureReason, err: PackError) -> ContextPackBuildResult {
        let options = ContextPackOptions::for_project("/repo");
        ContextPackBuildResult::Failure {
            reason,
            report: ContextPackReport::for_error(&options, &err),
        }
    }

    #[test]
    fn test_exit_status_policy() {
        let context = RepoContext {
            project_dir: PathBuf::from("/repo"),
            repo_root: PathBuf::from("/repo"),
            base_ref: "main".to_string(),
            base_commit: "abc".to_string(),
            head_commit: "def".to_string(),
        };
        let paths = OutputPaths::in_dir(Path::new("/out"), "pr-context.txt");
        let ok = ContextPackBuildResult::Success {
            pack_path: paths.pack.clone(),
            paths,
            report: ContextPackReport::for_run(ReportStatus::Ok, &context, 100),
        };
        let over = failure(
            FailureReason::CoreOverBudget,
            PackError::CoreOverBudget { over: 12 },
        );
        let error = failure(FailureReason::Error, PackError::Git("not a repo".into()));

        let cases = [
            (&ok, false, false),
            (&ok, true, false),
            (&over, false, false),
            (&over, true, true),
            (&error, false, true),
            (&error, true, true),
        ];
        for (result, fail_over_budget, expected) in cases {
            assert_eq!(
                exits_with_failure(result, fail_over_budget),
                expected,
                "{:?} with fail_over_budget={}",
                result.report().status,
                fail_over_budget
            );
        }
    }
}
