//! Dependency recall through the scribe covering-set CLI.
//!
//! Recall is best effort. A missing tool skips every target, a failing target
//! is recorded as a `failed` row, and neither stops the run.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::domain::{RelatedCandidate, RelationReason};
use crate::exec::{command_exists, ProcessRequest, ProcessRunner};
use crate::filters::{file_extension, normalize_path};

/// Pinned scribe release that understands `--covering-set`.
pub const SCRIBE_PACKAGE: &str = "@sibyllinesoft/scribe@1.0.4";

const SCRIBE_MAX_OUTPUT_BYTES: usize = 256 * 1024 * 1024;

/// Extensions scribe can build a dependency graph for.
const RECALL_TARGET_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".go",
];

const UNAVAILABLE_NOTE: &str = "scribe-modern-unavailable";
const FAILED_NOTE: &str = "scribe-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallTargetStatus {
    Ok,
    Failed,
    Skipped,
}

impl RecallTargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecallTargetStatus::Ok => "ok",
            RecallTargetStatus::Failed => "failed",
            RecallTargetStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RecallTargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-target outcome, persisted in the targets table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallTargetRow {
    pub target: String,
    pub status: RecallTargetStatus,
    pub total_paths: usize,
    pub eligible_paths: usize,
    pub limits_reached: bool,
    pub max_depth_reached: Option<u32>,
    pub note: Option<String>,
}

impl RecallTargetRow {
    fn empty(target: &str, status: RecallTargetStatus, note: &str) -> Self {
        Self {
            target: target.to_string(),
            status,
            total_paths: 0,
            eligible_paths: 0,
            limits_reached: false,
            max_depth_reached: None,
            note: Some(note.to_string()),
        }
    }

    pub fn skipped(target: &str, note: &str) -> Self {
        Self::empty(target, RecallTargetStatus::Skipped, note)
    }

    pub fn failed(target: &str, note: &str) -> Self {
        Self::empty(target, RecallTargetStatus::Failed, note)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallTargetRequest {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallTargetResult {
    pub row: RecallTargetRow,
    pub candidates: Vec<RelatedCandidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecallResult {
    pub targets: Vec<RecallTargetResult>,
    pub warnings: Vec<String>,
}

impl RecallResult {
    pub fn rows(&self) -> Vec<RecallTargetRow> {
        self.targets.iter().map(|t| t.row.clone()).collect()
    }

    /// Every target skipped with the same note.
    pub fn skipped(targets: &[RecallTargetRequest], note: &str, warning: String) -> Self {
        Self {
            targets: targets
                .iter()
                .map(|t| RecallTargetResult {
                    row: RecallTargetRow::skipped(&t.target, note),
                    candidates: Vec::new(),
                })
                .collect(),
            warnings: vec![warning],
        }
    }
}

/// Finds files related to changed files.
#[async_trait]
pub trait RecallTool: Send + Sync {
    /// One result per request, in request order. Never fails as a whole.
    async fn recall(
        &self,
        repo_root: &Path,
        targets: &[RecallTargetRequest],
        include_dependents: bool,
    ) -> RecallResult;
}

/// Whether a changed file can be used as a recall query.
pub fn is_recall_target(path: &str) -> bool {
    RECALL_TARGET_EXTENSIONS.contains(&file_extension(path).as_str())
}

/// Runs `npx -y @sibyllinesoft/scribe@1.0.4 <root> --covering-set <target> ...`.
pub struct ScribeRecall {
    runner: Arc<dyn ProcessRunner>,
    npx: String,
}

impl ScribeRecall {
    pub fn new(runner: Arc<dyn ProcessRunner>, npx: impl Into<String>) -> Self {
        Self {
            runner,
            npx: npx.into(),
        }
    }

    fn scribe_request(&self) -> ProcessRequest {
        ProcessRequest::new(&self.npx)
            .args(["-y", SCRIBE_PACKAGE])
            .max_output_bytes(SCRIBE_MAX_OUTPUT_BYTES)
    }

    /// True when npx exists and the resolved scribe supports covering sets.
    async fn is_available(&self) -> bool {
        if !command_exists(self.runner.as_ref(), &self.npx).await {
            return false;
        }

        let help = match self.runner.run(self.scribe_request().arg("--help")).await {
            Ok(output) => format!("{}\n{}", output.stdout, output.stderr),
            Err(e) => e.diagnostic(),
        };
        is_modern_help(&help)
    }

    async fn query(
        &self,
        repo_root: &Path,
        request: &RecallTargetRequest,
        include_dependents: bool,
    ) -> Result<String, String> {
        let mut process = self
            .scribe_request()
            .arg(repo_root.to_string_lossy())
            .args(["--covering-set", request.target.as_str()])
            .args(["--granularity", "file", "--stdout"]);
        if include_dependents {
            process = process.arg("--include-dependents");
        }

        self.runner
            .run(process)
            .await
            .map(|output| output.stdout)
            .map_err(|e| e.diagnostic())
    }
}

#[async_trait]
impl RecallTool for ScribeRecall {
    async fn recall(
        &self,
        repo_root: &Path,
        targets: &[RecallTargetRequest],
        include_dependents: bool,
    ) -> RecallResult {
        if targets.is_empty() {
            return RecallResult::default();
        }

        if !self.is_available().await {
            warn!("scribe unavailable, skipping related expansion");
            return RecallResult::skipped(
                targets,
                UNAVAILABLE_NOTE,
                format!(
                    "Modern scribe is unavailable. Install/use {} via npx; skipping related expansion.",
                    SCRIBE_PACKAGE
                ),
            );
        }

        let root = repo_root.to_string_lossy();
        let mut result = RecallResult::default();

        for request in targets {
            match self.query(repo_root, request, include_dependents).await {
                Ok(xml) => {
                    let parsed = parse_scribe_xml(&request.target, &xml, &root);
                    debug!(
                        "Recall for {}: {} of {} paths eligible",
                        request.target, parsed.row.eligible_paths, parsed.row.total_paths
                    );
                    result.targets.push(parsed);
                }
                Err(message) => {
                    let summary = summarize_scribe_error(&message);
                    warn!("Recall failed for {}: {}", request.target, summary);
                    result.warnings.push(format!(
                        "Scribe query failed for target {}: {}",
                        request.target, summary
                    ));
                    result.targets.push(RecallTargetResult {
                        row: RecallTargetRow::failed(&request.target, FAILED_NOTE),
                        candidates: Vec::new(),
                    });
                }
            }
        }

        info!(
            "Recall finished: {} target(s), {} warning(s)",
            result.targets.len(),
            result.warnings.len()
        );
        result
    }
}

fn is_modern_help(help: &str) -> bool {
    help.contains("--covering-set") && help.contains("--granularity") && help.contains("--stdout")
}

fn file_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<file>([\s\S]*?)</file>").expect("valid file block regex"))
}

fn tag_regex(tag: &str) -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    static REASON: OnceLock<Regex> = OnceLock::new();
    static DISTANCE: OnceLock<Regex> = OnceLock::new();
    static LIMITS: OnceLock<Regex> = OnceLock::new();
    static MAX_DEPTH: OnceLock<Regex> = OnceLock::new();

    let cell = match tag {
        "path" => &PATH,
        "reason" => &REASON,
        "distance" => &DISTANCE,
        "limits_reached" => &LIMITS,
        _ => &MAX_DEPTH,
    };
    cell.get_or_init(|| {
        Regex::new(&format!(r"<{tag}>([\s\S]*?)</{tag}>", tag = regex::escape(tag)))
            .expect("valid tag regex")
    })
}

fn extract_tag_value(xml: &str, tag: &str) -> Option<String> {
    tag_regex(tag)
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_xml(m.as_str()))
}

fn decode_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .trim()
        .to_string()
}

/// Strip `repo_root/` from an absolute path; `None` when it lies outside the repo.
fn to_repo_relative_path(abs_path: &str, repo_root: &str) -> Option<String> {
    let root = repo_root.replace('\\', "/");
    let root = root.trim_end_matches('/');
    let abs = abs_path.replace('\\', "/");

    abs.strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string)
}

fn parse_distance(raw: Option<String>) -> u32 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(|value| value.min(u32::MAX as f64) as u32)
        .unwrap_or(0)
}

/// Turn one covering-set document into candidates for `target`.
pub fn parse_scribe_xml(target: &str, xml: &str, repo_root: &str) -> RecallTargetResult {
    let mut total_paths = 0;
    let mut candidates = Vec::new();

    for block in file_block_regex().captures_iter(xml) {
        total_paths += 1;
        let Some(body) = block.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(abs_path) = extract_tag_value(body, "path").filter(|p| !p.is_empty()) else {
            continue;
        };
        let Some(relative) = to_repo_relative_path(&abs_path, repo_root) else {
            continue;
        };
        if relative == target {
            continue;
        }

        let reason = extract_tag_value(body, "reason")
            .map(|raw| RelationReason::parse(&raw))
            .unwrap_or(RelationReason::Unknown);
        let distance = parse_distance(extract_tag_value(body, "distance"));

        candidates.push(RelatedCandidate::new(normalize_path(&relative), reason, distance));
    }

    let limits_reached = extract_tag_value(xml, "limits_reached")
        .map(|raw| raw.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let max_depth_reached =
        extract_tag_value(xml, "max_depth_reached").and_then(|raw| raw.parse::<u32>().ok());

    RecallTargetResult {
        row: RecallTargetRow {
            target: target.to_string(),
            status: RecallTargetStatus::Ok,
            total_paths,
            eligible_paths: candidates.len(),
            limits_reached,
            max_depth_reached,
            note: None,
        },
        candidates,
    }
}

/// First `error:` line, else the first non-empty line.
pub fn summarize_scribe_error(raw: &str) -> String {
    let normalized = raw.replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    lines
        .iter()
        .find(|line| line.to_lowercase().starts_with("error:"))
        .or_else(|| lines.first())
        .map(|line| line.to_string())
        .unwrap_or_else(|| "unknown scribe error".to_string())
}

#[cfg(test)]
pub mod testing {
    //! Canned recall answers keyed by target.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRecall {
        answers: HashMap<String, Vec<RelatedCandidate>>,
        failures: HashMap<String, String>,
        limits: HashMap<String, u32>,
        dependents_flags: Mutex<Vec<bool>>,
    }

    impl FakeRecall {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(mut self, target: &str, candidates: Vec<RelatedCandidate>) -> Self {
            self.answers.insert(target.to_string(), candidates);
            self
        }

        pub fn fail(mut self, target: &str, message: &str) -> Self {
            self.failures.insert(target.to_string(), message.to_string());
            self
        }

        /// Report traversal limits hit at `max_depth` for `target`.
        pub fn limited(mut self, target: &str, max_depth: u32) -> Self {
            self.limits.insert(target.to_string(), max_depth);
            self
        }

        /// The `include_dependents` flag of every call so far.
        pub fn dependents_flags(&self) -> Vec<bool> {
            self.dependents_flags
                .lock()
                .map(|flags| flags.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl RecallTool for FakeRecall {
        async fn recall(
            &self,
            _repo_root: &Path,
            targets: &[RecallTargetRequest],
            include_dependents: bool,
        ) -> RecallResult {
            if let Ok(mut flags) = self.dependents_flags.lock() {
                flags.push(include_dependents);
            }

            let mut result = RecallResult::default();
            for request in targets {
                if let Some(message) = self.failures.get(&request.target) {
                    result.warnings.push(format!(
                        "Scribe query failed for target {}: {}",
                        request.target, message
                    ));
                    result.targets.push(RecallTargetResult {
                        row: RecallTargetRow::failed(&request.target, FAILED_NOTE),
                        candidates: Vec::new(),
                    });
                    continue;
                }

                let candidates = self
                    .answers
                    .get(&request.target)
                    .cloned()
                    .unwrap_or_default();
                let max_depth_reached = self.limits.get(&request.target).copied();
                result.targets.push(RecallTargetResult {
                    row: RecallTargetRow {
                        target: request.target.clone(),
                        status: RecallTargetStatus::Ok,
                        total_paths: candidates.len(),
                        eligible_paths: candidates.len(),
                        limits_reached: max_depth_reached.is_some(),
                        max_depth_reached,
                        note: None,
                    },
                    candidates,
                });
            }
            result
        }
    }
}
