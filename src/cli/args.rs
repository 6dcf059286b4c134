use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::budget::{DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS, DEFAULT_CLOSE_TEST_RESERVE_RATIO};
use crate::config::{
    ContextPackOptions, FitPolicy, ToolPaths, DEFAULT_BUDGET, DEFAULT_DIFF_CONTEXT,
    DEFAULT_ESTIMATE_CONCURRENCY, DEFAULT_OUTPUT_NAME,
};
use crate::report::validate_output_name;

/// Review Pack - budgeted PR context packs for LLM code review
#[derive(Parser)]
#[command(name = "review-pack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub pack: PackArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a context pack (the default when no command is given)
    Pack(PackArgs),
    /// List the changed files and whether they would be packed (no recall, no token counting)
    Preview(PackArgs),
    /// Print the summary of a persisted report
    Report {
        /// Path to a `<name>.report.json` file
        file: PathBuf,

        /// Print the report JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    /// Directory to review (defaults to the git root of the current directory)
    #[arg(short = 'p', long, env = "REVIEW_PACK_PROJECT")]
    pub project: Option<PathBuf>,

    /// Base ref to diff against (auto-detected when absent)
    #[arg(short = 'b', long, env = "REVIEW_PACK_BASE")]
    pub base: Option<String>,

    /// Token budget for the whole pack
    #[arg(long, env = "REVIEW_PACK_BUDGET", default_value_t = DEFAULT_BUDGET)]
    pub budget: u64,

    /// File name of the pack; manifests share its base name
    #[arg(
        long,
        env = "REVIEW_PACK_OUTPUT_NAME",
        default_value = DEFAULT_OUTPUT_NAME,
        value_parser = parse_output_name
    )]
    pub output_name: String,

    /// Write artifacts to this directory
    #[arg(long, env = "REVIEW_PACK_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write artifacts to <repo>/prompt instead of the temp directory
    #[arg(long)]
    pub output_dir_in_repo: bool,

    /// Do not ask the recall tool for dependents
    #[arg(long)]
    pub no_dependents: bool,

    /// Keep related files under docs directories
    #[arg(long)]
    pub include_docs: bool,

    /// Drop related test files
    #[arg(long)]
    pub no_tests: bool,

    /// Keep lockfiles
    #[arg(long)]
    pub include_lockfiles: bool,

    /// Keep .env files
    #[arg(long)]
    pub include_env: bool,

    /// Keep key, certificate and credential files
    #[arg(long)]
    pub include_secrets: bool,

    /// Context lines in the unified diff
    #[arg(long, env = "REVIEW_PACK_DIFF_CONTEXT", default_value_t = DEFAULT_DIFF_CONTEXT)]
    pub diff_context: u32,

    /// Skip the `gh pr view` description section
    #[arg(long)]
    pub no_pr_description: bool,

    /// Pull request number, URL or branch for `gh pr view`
    #[arg(long = "pr", env = "REVIEW_PACK_PR")]
    pub pr_ref: Option<String>,

    /// Exit non-zero when the changed files alone exceed the budget
    #[arg(long, env = "REVIEW_PACK_FAIL_OVER_BUDGET")]
    pub fail_over_budget: bool,

    /// How related files are fitted into the budget
    #[arg(long, value_enum, env = "REVIEW_PACK_FIT_POLICY", default_value_t = FitPolicy::CloseTestPreference)]
    pub fit_policy: FitPolicy,

    /// Share of the related budget held back for close tests
    #[arg(long, default_value_t = DEFAULT_CLOSE_TEST_RESERVE_RATIO)]
    pub close_test_reserve_ratio: f64,

    /// Minimum tokens held back for close tests
    #[arg(long, default_value_t = DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS)]
    pub close_test_reserve_min_tokens: u64,

    /// Concurrent per-file token counts
    #[arg(long, env = "REVIEW_PACK_CONCURRENCY", default_value_t = DEFAULT_ESTIMATE_CONCURRENCY)]
    pub estimate_concurrency: usize,

    /// git executable
    #[arg(long, env = "REVIEW_PACK_GIT", default_value = "git")]
    pub git: String,

    /// tokencount executable
    #[arg(long, env = "REVIEW_PACK_TOKENCOUNT", default_value = "tokencount")]
    pub tokencount: String,

    /// npx executable used to run scribe
    #[arg(long, env = "REVIEW_PACK_NPX", default_value = "npx")]
    pub npx: String,

    /// gh executable
    #[arg(long, env = "REVIEW_PACK_GH", default_value = "gh")]
    pub gh: String,

    /// Print the report JSON instead of the summary
    #[arg(long)]
    pub json: bool,
}

fn parse_output_name(raw: &str) -> Result<String, String> {
    validate_output_name(raw).map(|()| raw.to_string())
}

impl PackArgs {
    pub fn to_options(&self, project_dir: PathBuf) -> ContextPackOptions {
        ContextPackOptions {
            project_dir,
            base_ref: self.base.clone(),
            budget: self.budget,
            output_name: self.output_name.clone(),
            tmp_output: !self.output_dir_in_repo,
            output_dir: self.output_dir.clone(),
            include_dependents: !self.no_dependents,
            include_docs: self.include_docs,
            include_tests: !self.no_tests,
            include_lockfiles: self.include_lockfiles,
            include_env: self.include_env,
            include_secrets: self.include_secrets,
            diff_context: self.diff_context,
            include_pr_description: !self.no_pr_description,
            pr_ref: self.pr_ref.clone(),
            fail_over_budget: self.fail_over_budget,
            fit_policy: self.fit_policy,
            close_test_reserve_ratio: self.close_test_reserve_ratio,
            close_test_reserve_min_tokens: self.close_test_reserve_min_tokens,
            estimate_concurrency: self.estimate_concurrency,
            tools: ToolPaths {
                git: self.git.clone(),
                tokencount: self.tokencount.clone(),
                npx: self.npx.clone(),
                gh: self.gh.clone(),
            },
        }
    }
}
