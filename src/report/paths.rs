//! Output directory and artifact naming.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::config::ContextPackOptions;
use crate::error::PackError;

const DEFAULT_BASE_NAME: &str = "pr-context";
const DEFAULT_EXTENSION: &str = "txt";

/// Resolved location of every artifact of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub output_dir: PathBuf,
    pub pack: PathBuf,
    pub changed_manifest: PathBuf,
    pub related_manifest: PathBuf,
    pub omitted_manifest: PathBuf,
    pub related_omitted_manifest: PathBuf,
    pub related_selection_manifest: PathBuf,
    pub scribe_targets_manifest: PathBuf,
    pub report_path: PathBuf,
}

impl OutputPaths {
    /// Artifact names for `output_name` inside `output_dir`.
    pub fn in_dir(output_dir: &Path, output_name: &str) -> Self {
        let base = output_base_name(output_name);
        let file = |suffix: &str| output_dir.join(format!("{}.{}", base, suffix));

        Self {
            output_dir: output_dir.to_path_buf(),
            pack: output_dir.join(output_name),
            changed_manifest: file("changed.files.txt"),
            related_manifest: file("related.files.txt"),
            omitted_manifest: file("omitted.files.txt"),
            related_omitted_manifest: file("related.omitted.files.txt"),
            related_selection_manifest: file("related.selection.tsv"),
            scribe_targets_manifest: file("scribe.targets.tsv"),
            report_path: file("report.json"),
        }
    }

    /// Resolve the output directory for this run and create it.
    pub async fn create(
        options: &ContextPackOptions,
        repo_root: &Path,
        now: DateTime<Local>,
    ) -> Result<Self, PackError> {
        validate_output_name(&options.output_name).map_err(PackError::Other)?;

        let output_dir = resolve_output_dir(options, repo_root, now);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| PackError::io(format!("create {}", output_dir.display()), e))?;
        Ok(Self::in_dir(&output_dir, &options.output_name))
    }
}

/// Explicit directory, else a timestamped temp directory, else `<repo>/prompt`.
pub fn resolve_output_dir(
    options: &ContextPackOptions,
    repo_root: &Path,
    now: DateTime<Local>,
) -> PathBuf {
    if let Some(dir) = &options.output_dir {
        return dir.clone();
    }

    if options.tmp_output {
        std::env::temp_dir().join("context-packer").join(format!(
            "pr-{}-{}",
            sanitize_repo_slug(repo_root),
            now.format("%Y%m%d-%H%M%S")
        ))
    } else {
        repo_root.join("prompt")
    }
}

/// Repo directory name with whitespace runs turned into `-` and anything
/// outside `[A-Za-z0-9._-]` dropped.
pub fn sanitize_repo_slug(repo_root: &Path) -> String {
    let raw = repo_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut slug = String::with_capacity(raw.len());
    let mut in_whitespace = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            slug.push(ch);
        }
    }

    if slug.is_empty() {
        "repo".to_string()
    } else {
        slug
    }
}

/// The pack name must be a plain file name inside the output directory.
pub fn validate_output_name(output_name: &str) -> Result<(), String> {
    let name = output_name.trim();
    if name.is_empty() {
        return Err("output name must not be empty".to_string());
    }
    if name.contains('/') || name.contains('\\') {
        return Err(format!(
            "output name must be a file name, not a path: {}",
            output_name
        ));
    }
    if name == "." || name == ".." {
        return Err(format!("invalid output name: {}", output_name));
    }
    Ok(())
}

/// Split `name.ext`; a leading dot does not start an extension.
fn split_extension(output_name: &str) -> (&str, &str) {
    let start = output_name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match output_name[start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let index = start + dot;
            (&output_name[..index], &output_name[index + 1..])
        }
        _ => (output_name, ""),
    }
}

pub fn output_base_name(output_name: &str) -> String {
    let (base, _) = split_extension(output_name);
    if base.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        base.to_string()
    }
}

/// Extension handed to the token oracle when counting the pack.
pub fn output_extension(output_name: &str) -> String {
    let (_, ext) = split_extension(output_name);
    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext.to_string()
    }
}
