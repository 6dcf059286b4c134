//! Git snapshot collection.
//!
//! Resolves the review range (merge-base of `HEAD` and the base ref up to
//! `HEAD`) and captures the name-status listing, the unified diff and the list
//! of changed files. The `git` executable is the only I/O dependency.

mod types;

pub use types::{GitSnapshot, RepoContext};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::ChangedFileRecord;
use crate::error::PackError;
use crate::exec::{ProcessRequest, ProcessRunner};

/// Tried in order when no base ref is given.
pub const BASE_REF_CANDIDATES: &[&str] = &["origin/main", "origin/master", "main", "master", "HEAD~1"];

const GIT_MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

pub struct GitClient {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl GitClient {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String, PackError> {
        let request = ProcessRequest::new(&self.program)
            .args(args.iter().copied())
            .current_dir(cwd)
            .max_output_bytes(GIT_MAX_OUTPUT_BYTES);

        self.runner
            .run(request)
            .await
            .map(|output| output.stdout)
            .map_err(|e| {
                PackError::Git(format!(
                    "git {} failed in {}: {}",
                    args.join(" "),
                    cwd.display(),
                    e.diagnostic()
                ))
            })
    }

    async fn verify_ref(&self, cwd: &Path, reference: &str) -> bool {
        let spec = format!("{}^{{commit}}", reference);
        self.run(cwd, &["rev-parse", "--verify", &spec]).await.is_ok()
    }

    /// Find the repository root and the base/head commits of the review range.
    pub async fn resolve_repo_context(
        &self,
        project_dir: &Path,
        base_ref: Option<&str>,
    ) -> Result<RepoContext, PackError> {
        let inside = self
            .run(project_dir, &["rev-parse", "--is-inside-work-tree"])
            .await?;
        if !inside.trim().eq_ignore_ascii_case("true") {
            return Err(PackError::Git(format!(
                "Not a git repository: {}",
                project_dir.display()
            )));
        }

        let toplevel = self
            .run(project_dir, &["rev-parse", "--show-toplevel"])
            .await?;
        let repo_root = Path::new(toplevel.trim()).to_path_buf();

        let base_ref = match base_ref.map(str::trim).filter(|r| !r.is_empty()) {
            Some(explicit) => {
                if !self.verify_ref(&repo_root, explicit).await {
                    return Err(PackError::Git(format!("Base ref not found: {}", explicit)));
                }
                explicit.to_string()
            }
            None => self.detect_base_ref(&repo_root).await?,
        };

        let base_commit = self
            .run(&repo_root, &["merge-base", "HEAD", &base_ref])
            .await?
            .trim()
            .to_string();
        let head_commit = self
            .run(&repo_root, &["rev-parse", "HEAD"])
            .await?
            .trim()
            .to_string();

        info!(
            "Reviewing {}...{} (base ref {})",
            base_commit, head_commit, base_ref
        );

        Ok(RepoContext {
            project_dir: project_dir.to_path_buf(),
            repo_root,
            base_ref,
            base_commit,
            head_commit,
        })
    }

    async fn detect_base_ref(&self, repo_root: &Path) -> Result<String, PackError> {
        for candidate in BASE_REF_CANDIDATES {
            if self.verify_ref(repo_root, candidate).await {
                debug!("Auto-detected base ref {}", candidate);
                return Ok(candidate.to_string());
            }
        }

        Err(PackError::Git(format!(
            "Could not auto-detect base ref ({})",
            BASE_REF_CANDIDATES.join(", ")
        )))
    }

    /// Collect the changed files, name-status and diff of `base_commit...HEAD`.
    pub async fn collect_snapshot(
        &self,
        context: &RepoContext,
        diff_context: u32,
    ) -> Result<GitSnapshot, PackError> {
        let range = format!("{}...HEAD", context.base_commit);
        let root = context.repo_root.as_path();

        let changed = self
            .run(root, &["diff", "--name-only", "--diff-filter=ACMR", &range])
            .await?;
        if changed.trim().is_empty() {
            return Err(PackError::Git(format!(
                "No changed files found between {} and HEAD",
                context.base_ref
            )));
        }

        let name_status_text = self.run(root, &["diff", "--name-status", &range]).await?;
        let unified = format!("--unified={}", diff_context);
        let diff_text = self
            .run(root, &["diff", "--no-color", &unified, &range])
            .await?;

        let changed_files = parse_name_status(&name_status_text);
        if changed_files.is_empty() {
            return Err(PackError::Git(format!(
                "No parseable changed files found between {} and HEAD",
                context.base_ref
            )));
        }

        debug!("{} changed file(s) in {}", changed_files.len(), range);

        Ok(GitSnapshot {
            changed_files,
            name_status_text,
            diff_text,
        })
    }
}

/// Parse `git diff --name-status` output.
///
/// Rename and copy records resolve to their destination path; the last record
/// for a path wins. Output is sorted by path.
pub fn parse_name_status(raw: &str) -> Vec<ChangedFileRecord> {
    let mut by_path: BTreeMap<String, String> = BTreeMap::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 2 {
            continue;
        }

        let status = parts[0].trim();
        let mut path = parts[1].trim();
        if status.starts_with('R') || status.starts_with('C') {
            if let Some(destination) = parts.get(2).filter(|p| !p.is_empty()) {
                path = destination.trim();
            }
        }

        if path.is_empty() {
            continue;
        }
        by_path.insert(path.to_string(), status.to_string());
    }

    by_path
        .into_iter()
        .map(|(path, status)| ChangedFileRecord { path, status })
        .collect()
}
