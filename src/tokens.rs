//! Token-count oracle.
//!
//! Token counts come from the external `tokencount` binary; nothing in the
//! crate tries to predict them.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::PackError;
use crate::exec::{command_exists, ProcessRequest, ProcessRunner};

/// Encoding every count is taken under.
pub const TOKEN_ENCODING: &str = "o200k-base";

#[async_trait]
pub trait TokenOracle: Send + Sync {
    /// Fails with [`PackError::Token`] when the oracle cannot be used at all.
    async fn ensure_available(&self) -> Result<(), PackError>;

    /// Count the tokens of `path`, treating it as a file with extension `include_ext`.
    async fn count_file(&self, path: &Path, include_ext: &str) -> Result<u64, PackError>;
}

/// `tokencount --encoding o200k-base --include-ext <ext> <file>`.
pub struct TokencountOracle {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl TokencountOracle {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }
}

#[async_trait]
impl TokenOracle for TokencountOracle {
    async fn ensure_available(&self) -> Result<(), PackError> {
        if command_exists(self.runner.as_ref(), &self.program).await {
            Ok(())
        } else {
            Err(PackError::Token(format!(
                "{} not found. Install with: cargo install tokencount",
                self.program
            )))
        }
    }

    async fn count_file(&self, path: &Path, include_ext: &str) -> Result<u64, PackError> {
        let request = ProcessRequest::new(&self.program)
            .args(["--encoding", TOKEN_ENCODING, "--include-ext", include_ext])
            .arg(path.to_string_lossy());

        let output = self.runner.run(request).await.map_err(|e| {
            PackError::Token(format!(
                "tokencount failed for {}: {}",
                path.display(),
                e.diagnostic()
            ))
        })?;

        parse_token_count(&output.stdout).ok_or_else(|| {
            PackError::Token(format!(
                "Could not parse tokencount output for {}: {}",
                path.display(),
                output.stdout.trim()
            ))
        })
    }
}

/// First whitespace-separated token of the first non-empty line, as a
/// non-negative number. Fractions are floored.
pub fn parse_token_count(stdout: &str) -> Option<u64> {
    let first = stdout
        .lines()
        .find(|line| !line.trim().is_empty())?
        .split_whitespace()
        .next()?;

    let value: f64 = first.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.floor() as u64)
}

#[cfg(test)]
pub mod testing {
    //! Oracle that counts bytes instead of spawning `tokencount`.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeOracle {
        bytes_per_token: u64,
        available: bool,
        counts: AtomicUsize,
        surcharges: Vec<Surcharge>,
    }

    struct Surcharge {
        file_name: String,
        marker: String,
        extra: u64,
    }

    impl FakeOracle {
        /// One token per `bytes_per_token` bytes, rounded up.
        pub fn bytes_per_token(bytes_per_token: u64) -> Self {
            Self {
                bytes_per_token: bytes_per_token.max(1),
                available: true,
                counts: AtomicUsize::new(0),
                surcharges: Vec::new(),
            }
        }

        /// Charge `extra` more tokens whenever a file named `file_name`
        /// contains `marker`.
        pub fn surcharge(mut self, file_name: &str, marker: &str, extra: u64) -> Self {
            self.surcharges.push(Surcharge {
                file_name: file_name.to_string(),
                marker: marker.to_string(),
                extra,
            });
            self
        }

        pub fn unavailable() -> Self {
            Self {
                available: false,
                ..Self::bytes_per_token(1)
            }
        }

        /// How many files were counted so far.
        pub fn count_calls(&self) -> usize {
            self.counts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenOracle for FakeOracle {
        async fn ensure_available(&self) -> Result<(), PackError> {
            if self.available {
                Ok(())
            } else {
                Err(PackError::Token("tokencount not found".to_string()))
            }
        }

        async fn count_file(&self, path: &Path, _include_ext: &str) -> Result<u64, PackError> {
            self.counts.fetch_add(1, Ordering::SeqCst);
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| PackError::io(format!("read {}", path.display()), e))?;
            let base = (bytes.len() as u64).div_ceil(self.bytes_per_token);

            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let text = String::from_utf8_lossy(&bytes);
            let extra: u64 = self
                .surcharges
                .iter()
                .filter(|s| s.file_name == file_name && text.contains(&s.marker))
                .map(|s| s.extra)
                .sum();
            Ok(base + extra)
        }
    }
}
