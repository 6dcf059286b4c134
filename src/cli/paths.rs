use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Find the git root directory by searching upward from `start`.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut path = start;

    loop {
        if path.join(".git").exists() {
            return Some(path.to_path_buf());
        }
        path = path.parent()?;
    }
}

/// Resolve the directory to review: the given one, else the enclosing git
/// root, else the current directory.
pub fn resolve_project_dir(project: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = project {
        return path
            .canonicalize()
            .with_context(|| format!("Failed to canonicalize project directory: {}", path.display()));
    }

    let current = std::env::current_dir().context("Failed to get current directory")?;
    Ok(find_git_root(&current).unwrap_or(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_git_root_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let nested = temp_dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_git_root(&nested), Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn test_explicit_project_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        assert!(resolve_project_dir(Some(temp_dir.path().join("missing"))).is_err());
        assert_eq!(
            resolve_project_dir(Some(temp_dir.path().to_path_buf())).unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
    }
}
