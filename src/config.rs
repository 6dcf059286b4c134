//! Run configuration.
//!
//! A [`ContextPackOptions`] value is fixed for the lifetime of a run; every
//! downstream decision is a function of it plus the repository contents.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::budget::{DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS, DEFAULT_CLOSE_TEST_RESERVE_RATIO};

/// Default token budget for a whole pack.
pub const DEFAULT_BUDGET: u64 = 272_000;

/// Default file name of the rendered pack.
pub const DEFAULT_OUTPUT_NAME: &str = "pr-context.txt";

/// Default unified diff context lines.
pub const DEFAULT_DIFF_CONTEXT: u32 = 3;

/// Default number of concurrent per-candidate token estimates.
pub const DEFAULT_ESTIMATE_CONCURRENCY: usize = 4;

/// Which budget fitting strategy decides the provisional related set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitPolicy {
    /// Reserve part of the budget for close test files.
    #[default]
    CloseTestPreference,
    /// Single greedy pass in priority order.
    Plain,
}

/// Executables used for the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPaths {
    pub git: String,
    pub tokencount: String,
    pub npx: String,
    pub gh: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            tokencount: "tokencount".to_string(),
            npx: "npx".to_string(),
            gh: "gh".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextPackOptions {
    pub project_dir: PathBuf,
    /// Explicit base ref; auto-detected when absent.
    pub base_ref: Option<String>,
    pub budget: u64,
    pub output_name: String,
    /// Write artifacts under the system temp dir instead of `<repo>/prompt`.
    pub tmp_output: bool,
    /// Explicit output directory, overriding both locations above.
    pub output_dir: Option<PathBuf>,
    pub include_dependents: bool,
    pub include_docs: bool,
    pub include_tests: bool,
    pub include_lockfiles: bool,
    pub include_env: bool,
    pub include_secrets: bool,
    pub diff_context: u32,
    pub include_pr_description: bool,
    pub pr_ref: Option<String>,
    /// Treat `core-over-budget` as a failing exit status.
    pub fail_over_budget: bool,
    pub fit_policy: FitPolicy,
    pub close_test_reserve_ratio: f64,
    pub close_test_reserve_min_tokens: u64,
    pub estimate_concurrency: usize,
    pub tools: ToolPaths,
}

impl Default for ContextPackOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            base_ref: None,
            budget: DEFAULT_BUDGET,
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            tmp_output: true,
            output_dir: None,
            include_dependents: true,
            include_docs: false,
            include_tests: true,
            include_lockfiles: false,
            include_env: false,
            include_secrets: false,
            diff_context: DEFAULT_DIFF_CONTEXT,
            include_pr_description: true,
            pr_ref: None,
            fail_over_budget: false,
            fit_policy: FitPolicy::default(),
            close_test_reserve_ratio: DEFAULT_CLOSE_TEST_RESERVE_RATIO,
            close_test_reserve_min_tokens: DEFAULT_CLOSE_TEST_RESERVE_MIN_TOKENS,
            estimate_concurrency: DEFAULT_ESTIMATE_CONCURRENCY,
            tools: ToolPaths::default(),
        }
    }
}

impl ContextPackOptions {
    pub fn for_project(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }
}
