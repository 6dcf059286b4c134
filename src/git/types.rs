//! Git snapshot types.

use std::path::PathBuf;

use crate::domain::ChangedFileRecord;

/// Where the review range starts and ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    /// Directory the run was started from.
    pub project_dir: PathBuf,
    pub repo_root: PathBuf,
    pub base_ref: String,
    /// Merge-base of `HEAD` and `base_ref`, not the ref tip.
    pub base_commit: String,
    pub head_commit: String,
}

/// Everything git reports about `base_commit...HEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSnapshot {
    /// Deduplicated by destination path and sorted by path.
    pub changed_files: Vec<ChangedFileRecord>,
    pub name_status_text: String,
    pub diff_text: String,
}
