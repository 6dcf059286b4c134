//! Run-scoped file content cache.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::PackError;

/// Bytes inspected for a NUL when deciding whether a file is binary.
pub const BINARY_SNIFF_BYTES: usize = 8192;

/// SHA256 of path + content, hex encoded.
pub fn compute_content_digest(relative_path: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(content);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// What a quick look at a repo path found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
    Missing,
}

/// Existence and NUL-byte check on the first [`BINARY_SNIFF_BYTES`] bytes.
/// Anything that exists but cannot be read counts as binary.
pub async fn inspect_file(repo_root: &Path, relative_path: &str) -> FileKind {
    let absolute = repo_root.join(relative_path);
    match tokio::fs::metadata(&absolute).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return FileKind::Binary,
        Err(_) => return FileKind::Missing,
    }

    let file = match tokio::fs::File::open(&absolute).await {
        Ok(file) => file,
        Err(_) => return FileKind::Binary,
    };

    let mut head = Vec::with_capacity(BINARY_SNIFF_BYTES);
    match file
        .take(BINARY_SNIFF_BYTES as u64)
        .read_to_end(&mut head)
        .await
    {
        Ok(_) if !head.contains(&0) => FileKind::Text,
        _ => FileKind::Binary,
    }
}

/// Contents of every file loaded during one run, keyed by repo-relative path.
///
/// Each path is read from disk at most once; the changed-file pass, the
/// per-candidate estimates and every convergence render share the same text.
#[derive(Debug, Default)]
pub struct ContentCache {
    contents: HashMap<String, String>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `relative_path` under `repo_root` unless it is already cached.
    pub async fn load(&mut self, repo_root: &Path, relative_path: &str) -> Result<&str, PackError> {
        if !self.contents.contains_key(relative_path) {
            let absolute = repo_root.join(relative_path);
            let bytes = tokio::fs::read(&absolute)
                .await
                .map_err(|e| PackError::io(format!("read {}", absolute.display()), e))?;
            self.contents.insert(
                relative_path.to_string(),
                String::from_utf8_lossy(&bytes).into_owned(),
            );
        }

        Ok(self.get(relative_path).unwrap_or_default())
    }

    pub fn get(&self, relative_path: &str) -> Option<&str> {
        self.contents.get(relative_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compute_content_digest() {
        let digest = compute_content_digest("src/main.rs", b"fn main() {}");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, compute_content_digest("src/main.rs", b"fn main() {}"));
        assert_ne!(digest, compute_content_digest("src/lib.rs", b"fn main() {}"));
    }

    #[tokio::test]
    async fn test_inspect_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(temp_dir.path().join("logo.png"), [0x89, b'P', 0, 0x1a]).unwrap();
        std::fs::create_dir(temp_dir.path().join("dir")).unwrap();

        assert_eq!(inspect_file(temp_dir.path(), "a.rs").await, FileKind::Text);
        assert_eq!(inspect_file(temp_dir.path(), "logo.png").await, FileKind::Binary);
        assert_eq!(inspect_file(temp_dir.path(), "gone.rs").await, FileKind::Missing);
        assert_eq!(inspect_file(temp_dir.path(), "dir").await, FileKind::Binary);
    }

    #[tokio::test]
    async fn test_nul_after_sniff_window_is_text() {
        let temp_dir = TempDir::new().unwrap();
        let mut content = vec![b'a'; BINARY_SNIFF_BYTES];
        content.push(0);
        std::fs::write(temp_dir.path().join("big.txt"), content).unwrap();

        assert_eq!(inspect_file(temp_dir.path(), "big.txt").await, FileKind::Text);
    }

    #[tokio::test]
    async fn test_cache_reads_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.rs");
        std::fs::write(&path, "first").unwrap();

        let mut cache = ContentCache::new();
        assert_eq!(cache.load(temp_dir.path(), "a.rs").await.unwrap(), "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(cache.load(temp_dir.path(), "a.rs").await.unwrap(), "first");
        assert_eq!(cache.len(), 1);

        assert!(cache.load(temp_dir.path(), "missing.rs").await.is_err());
    }
}
