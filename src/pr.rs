//! Optional pull request description from the GitHub CLI.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::exec::{command_exists, ProcessRequest, ProcessRunner};

const PR_VIEW_FIELDS: &str = "number,title,body,url,baseRefName,headRefName,state,author";

pub const PR_DESCRIPTION_UNAVAILABLE: &str =
    "PR description unavailable via gh (missing gh, auth, or matching PR)";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PullRequestView {
    number: Option<u64>,
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    state: Option<String>,
    base_ref_name: Option<String>,
    head_ref_name: Option<String>,
    author: Option<PullRequestAuthor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullRequestAuthor {
    login: Option<String>,
}

pub struct PrDescriptionSource {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl PrDescriptionSource {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// The rendered `## PR Description` section, or `None` on any failure.
    pub async fn load(&self, repo_root: &Path, pr_ref: Option<&str>) -> Option<String> {
        if !command_exists(self.runner.as_ref(), &self.program).await {
            return None;
        }

        let mut request = ProcessRequest::new(&self.program)
            .args(["pr", "view"])
            .current_dir(repo_root);
        if let Some(pr_ref) = pr_ref {
            request = request.arg(pr_ref);
        }
        let request = request.args(["--json", PR_VIEW_FIELDS]);

        match self.runner.run(request).await {
            Ok(output) => render_pr_description(&output.stdout),
            Err(e) => {
                debug!("gh pr view failed: {}", e);
                None
            }
        }
    }
}

/// Render `gh pr view --json` output as a markdown section.
pub fn render_pr_description(json: &str) -> Option<String> {
    let view: PullRequestView = serde_json::from_str(json).ok()?;
    let text = |value: Option<String>| value.unwrap_or_default();

    let body = view
        .body
        .unwrap_or_else(|| "(no description)".to_string());

    let lines = [
        "## PR Description".to_string(),
        String::new(),
        format!(
            "- PR: #{}",
            view.number.map(|n| n.to_string()).unwrap_or_default()
        ),
        format!("- Title: {}", text(view.title)),
        format!("- URL: {}", text(view.url)),
        format!("- State: {}", text(view.state)),
        format!("- Base: {}", text(view.base_ref_name)),
        format!("- Head: {}", text(view.head_ref_name)),
        format!(
            "- Author: {}",
            text(view.author.and_then(|author| author.login))
        ),
        String::new(),
        "### Body".to_string(),
        String::new(),
        body.trim_end().to_string(),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    Some(lines.join("\n"))
}
