//! Context pack orchestration.
//!
//! One call to [`build_context_pack`] runs the whole pipeline: snapshot the
//! diff, select changed files, recall and rank related files, fit them into
//! the budget, then render and measure until the real token count fits.
//! Every fatal failure is folded into an `error` report instead of being
//! returned, so callers always get a report.

mod cache;
mod converge;
mod estimate;
mod gather;
mod types;

pub use gather::select_changed_files;
pub use types::{ContextPackBuildResult, FailureReason};

use cache::ContentCache;
use converge::{converge, PackMeasure};
use estimate::estimate_candidates;
use gather::gather_related_candidates;

use async_trait::async_trait;
use chrono::{Local, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::budget::{
    fit_related_candidates_to_budget, fit_related_candidates_with_close_test_preference,
    BudgetFit, BudgetFitInput, CloseTestPreference,
};
use crate::config::{ContextPackOptions, FitPolicy, ToolPaths};
use crate::domain::{OmissionReason, OmittedEntry, RankedRelatedCandidate};
use crate::error::PackError;
use crate::exec::{ProcessRunner, SystemRunner};
use crate::filters::is_test_like_path;
use crate::git::{GitClient, RepoContext};
use crate::pr::{PrDescriptionSource, PR_DESCRIPTION_UNAVAILABLE};
use crate::rank::rank_related_candidates;
use crate::recall::{is_recall_target, RecallTargetRequest, RecallTool, ScribeRecall};
use crate::render::{build_header_lines, render_context_pack, FileBlock, HeaderInfo, PackDocument};
use crate::report::{
    output_extension, timestamp, to_selection_rows, write_manifests, write_report,
    ContextPackReport, CountSummary, Manifests, OutputPaths, ReportStatus, TokenSummary,
};
use crate::tokens::{TokenOracle, TokencountOracle};

/// The external tools a run talks to.
pub struct Collaborators {
    pub git: GitClient,
    pub recall: Arc<dyn RecallTool>,
    pub oracle: Arc<dyn TokenOracle>,
    pub pr: PrDescriptionSource,
}

impl Collaborators {
    /// Real subprocess-backed collaborators.
    pub fn system(tools: &ToolPaths) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        Self {
            git: GitClient::new(runner.clone(), &tools.git),
            recall: Arc::new(ScribeRecall::new(runner.clone(), &tools.npx)),
            oracle: Arc::new(TokencountOracle::new(runner.clone(), &tools.tokencount)),
            pr: PrDescriptionSource::new(runner, &tools.gh),
        }
    }
}

/// What is known so far, for the error report.
#[derive(Default)]
struct RunState {
    context: Option<RepoContext>,
    paths: Option<OutputPaths>,
    warnings: Vec<String>,
    tokens: Option<TokenSummary>,
    counts: Option<CountSummary>,
}

/// Build a pack for `options`. Never fails; failures come back as a
/// [`ContextPackBuildResult::Failure`] carrying the persisted report.
pub async fn build_context_pack(
    options: &ContextPackOptions,
    collaborators: &Collaborators,
) -> ContextPackBuildResult {
    let mut state = RunState::default();

    match run_pipeline(options, collaborators, &mut state).await {
        Ok(result) => result,
        Err(err) => fail(options, state, err).await,
    }
}

async fn fail(options: &ContextPackOptions, state: RunState, err: PackError) -> ContextPackBuildResult {
    let (status, reason) = match err {
        PackError::CoreOverBudget { .. } => (ReportStatus::CoreOverBudget, FailureReason::CoreOverBudget),
        _ => (ReportStatus::Error, FailureReason::Error),
    };

    match reason {
        FailureReason::CoreOverBudget => warn!("{}", err),
        FailureReason::Error => error!("Context pack failed: {}", err),
    }

    let mut report = match &state.context {
        Some(context) => ContextPackReport::for_run(status, context, options.budget).with_error(&err),
        None => ContextPackReport::for_error(options, &err),
    };
    if let Some(tokens) = state.tokens {
        report = report.with_tokens(tokens);
    }
    if let Some(counts) = state.counts {
        report = report.with_counts(counts);
    }
    report = report.with_warnings(state.warnings);

    if let Some(paths) = &state.paths {
        report = report.with_paths(paths.into());
        if let Err(e) = write_report(&paths.report_path, &report).await {
            warn!("Failed to write error report: {}", e);
        }
    }

    ContextPackBuildResult::Failure { reason, report }
}

/// Renders the full pack to disk and counts it.
struct PackWriter<'a> {
    oracle: &'a dyn TokenOracle,
    cache: &'a ContentCache,
    header_lines: &'a [String],
    changed_files: &'a [FileBlock],
    omitted_changed: &'a [OmittedEntry],
    pack_path: &'a Path,
    extension: String,
}

impl PackWriter<'_> {
    fn related_blocks(&self, related: &[RankedRelatedCandidate]) -> Vec<FileBlock> {
        related
            .iter()
            .filter_map(|candidate| {
                self.cache
                    .get(&candidate.path)
                    .map(|content| FileBlock::new(candidate.path.clone(), content))
            })
            .collect()
    }
}

#[async_trait]
impl<'a> PackMeasure for PackWriter<'a> {
    async fn measure(&self, related: &[RankedRelatedCandidate]) -> Result<u64, PackError> {
        let related_files = self.related_blocks(related);
        let pack = render_context_pack(&PackDocument {
            header_lines: self.header_lines,
            changed_files: self.changed_files,
            related_files: &related_files,
            omitted_changed_files: self.omitted_changed,
        });

        tokio::fs::write(self.pack_path, format!("{}\n", pack))
            .await
            .map_err(|e| PackError::io(format!("write {}", self.pack_path.display()), e))?;

        self.oracle.count_file(self.pack_path, &self.extension).await
    }
}

fn fit(options: &ContextPackOptions, input: BudgetFitInput<'_>) -> BudgetFit {
    match options.fit_policy {
        FitPolicy::Plain => fit_related_candidates_to_budget(input),
        FitPolicy::CloseTestPreference => fit_related_candidates_with_close_test_preference(
            input,
            |candidate| is_test_like_path(&candidate.path),
            CloseTestPreference {
                reserve_ratio: options.close_test_reserve_ratio,
                reserve_min_tokens: options.close_test_reserve_min_tokens,
            },
        ),
    }
}

async fn run_pipeline(
    options: &ContextPackOptions,
    collaborators: &Collaborators,
    state: &mut RunState,
) -> Result<ContextPackBuildResult, PackError> {
    let budget = options.budget;
    collaborators.oracle.ensure_available().await?;

    let context = collaborators
        .git
        .resolve_repo_context(&options.project_dir, options.base_ref.as_deref())
        .await?;
    state.context = Some(context.clone());
    let repo_root = context.repo_root.as_path();

    let snapshot = collaborators
        .git
        .collect_snapshot(&context, options.diff_context)
        .await?;

    let paths = OutputPaths::create(options, repo_root, Local::now()).await?;
    state.paths = Some(paths.clone());
    info!("Writing context pack to {}", paths.output_dir.display());

    let changed = select_changed_files(repo_root, &snapshot.changed_files, options).await;
    if changed.included.is_empty() {
        return Err(PackError::Git(
            "No eligible changed files after filtering".to_string(),
        ));
    }

    let mut cache = ContentCache::new();
    let mut changed_files = Vec::with_capacity(changed.included.len());
    for path in &changed.included {
        let content = cache.load(repo_root, path).await?;
        changed_files.push(FileBlock::new(path.clone(), content));
    }

    let targets: Vec<RecallTargetRequest> = changed
        .included
        .iter()
        .filter(|path| is_recall_target(path))
        .map(|path| RecallTargetRequest {
            target: path.clone(),
        })
        .collect();
    let recall = collaborators
        .recall
        .recall(repo_root, &targets, options.include_dependents)
        .await;
    let target_rows = recall.rows();
    state.warnings.extend(recall.warnings.iter().cloned());
    state.warnings.extend(
        target_rows
            .iter()
            .filter(|row| row.limits_reached)
            .map(|row| format!("Scribe limits reached for target: {}", row.target)),
    );

    let gathered =
        gather_related_candidates(repo_root, &recall.targets, &changed.included, options, &mut cache)
            .await;
    let mut ledger = gathered.omitted;
    if !ledger.is_empty() {
        info!("{} related path(s) filtered before ranking", ledger.len());
    }
    debug!("Content cache holds {} file(s)", cache.len());
    let ranked = rank_related_candidates(gathered.candidates);

    let pr_description = if options.include_pr_description {
        let loaded = collaborators
            .pr
            .load(repo_root, options.pr_ref.as_deref())
            .await;
        if loaded.is_none() {
            state.warnings.push(PR_DESCRIPTION_UNAVAILABLE.to_string());
        }
        loaded
    } else {
        None
    };

    let generated_at = timestamp(Utc::now());
    let repo_root_text = context.repo_root.display().to_string();
    let project_dir_text = context.project_dir.display().to_string();
    let header_lines = build_header_lines(&HeaderInfo {
        generated_at: &generated_at,
        repo_root: &repo_root_text,
        project_dir: &project_dir_text,
        base_ref: &context.base_ref,
        base_commit: &context.base_commit,
        head_commit: &context.head_commit,
        budget,
        name_status_text: &snapshot.name_status_text,
        diff_text: &snapshot.diff_text,
        recall_targets: &target_rows,
        pr_description: pr_description.as_deref(),
    });

    let writer = PackWriter {
        oracle: collaborators.oracle.as_ref(),
        cache: &cache,
        header_lines: &header_lines,
        changed_files: &changed_files,
        omitted_changed: &changed.omitted,
        pack_path: &paths.pack,
        extension: output_extension(&options.output_name),
    };

    let baseline = writer.measure(&[]).await?;
    state.tokens = Some(TokenSummary::new(baseline, baseline, budget));
    info!(
        "Baseline is {} tokens for {} changed file(s), budget {}",
        baseline,
        changed.included.len(),
        budget
    );

    if baseline > budget {
        for candidate in &ranked {
            ledger.record(candidate.path.clone(), OmissionReason::OverBudget);
        }
        let selection_rows = to_selection_rows(&ranked, &HashSet::new(), &ledger);
        write_manifests(
            &paths,
            &Manifests {
                changed_included: &changed.included,
                related_included: &[],
                omitted_changed: &changed.omitted,
                omitted_related: &ledger,
                selection_rows: &selection_rows,
                target_rows: &target_rows,
            },
        )
        .await?;
        state.counts = Some(CountSummary::new(
            changed.included.len(),
            ranked.len(),
            0,
            ledger.len(),
            &target_rows,
        ));
        return Err(PackError::CoreOverBudget {
            over: baseline - budget,
        });
    }

    let ranked = estimate_candidates(
        collaborators.oracle.as_ref(),
        &cache,
        ranked,
        options.estimate_concurrency,
    )
    .await?;

    let provisional = fit(
        options,
        BudgetFitInput {
            budget,
            baseline_tokens: baseline,
            candidates: &ranked,
        },
    );
    info!(
        "Provisional fit: {} included, {} omitted, ~{} tokens",
        provisional.included.len(),
        provisional.omitted.len(),
        provisional.final_tokens_estimate
    );
    for omitted in &provisional.omitted {
        ledger.record(omitted.candidate.path.clone(), omitted.reason);
    }

    let converged = converge(&writer, budget, provisional.included).await?;
    for evicted in &converged.evicted {
        ledger.record(evicted.path.clone(), OmissionReason::OverBudget);
    }

    let included: HashSet<String> = converged
        .included
        .iter()
        .map(|candidate| candidate.path.clone())
        .collect();
    let mut related_included: Vec<String> = included.iter().cloned().collect();
    related_included.sort();
    let selection_rows = to_selection_rows(&ranked, &included, &ledger);

    write_manifests(
        &paths,
        &Manifests {
            changed_included: &changed.included,
            related_included: &related_included,
            omitted_changed: &changed.omitted,
            omitted_related: &ledger,
            selection_rows: &selection_rows,
            target_rows: &target_rows,
        },
    )
    .await?;

    let report = ContextPackReport::for_run(ReportStatus::Ok, &context, budget)
        .with_tokens(TokenSummary::new(baseline, converged.final_tokens, budget))
        .with_counts(CountSummary::new(
            changed.included.len(),
            ranked.len(),
            converged.included.len(),
            ledger.len(),
            &target_rows,
        ))
        .with_paths((&paths).into())
        .with_warnings(state.warnings.clone());
    write_report(&paths.report_path, &report).await?;

    info!(
        "Context pack ready: {} tokens of {} ({} related file(s))",
        converged.final_tokens,
        budget,
        converged.included.len()
    );

    Ok(ContextPackBuildResult::Success {
        pack_path: paths.pack.clone(),
        paths,
        report,
    })
}
