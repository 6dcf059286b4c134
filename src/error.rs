//! Error types for context pack construction.

use thiserror::Error;

use crate::report::ReportErrorCode;

/// A fatal failure somewhere in the pack pipeline.
///
/// Each variant maps to the error code persisted in the report, so callers
/// always see a classified failure rather than a bare message.
#[derive(Debug, Error)]
pub enum PackError {
    /// Version-control failures: not a repository, unresolvable ref, empty diff.
    #[error("{0}")]
    Git(String),

    /// Token oracle missing, failing or returning garbage.
    #[error("{0}")]
    Token(String),

    #[error("Core context exceeds budget by {over} tokens")]
    CoreOverBudget { over: u64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl PackError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PackError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> ReportErrorCode {
        match self {
            PackError::Git(_) => ReportErrorCode::GitError,
            PackError::Token(_) => ReportErrorCode::TokenError,
            PackError::CoreOverBudget { .. } => ReportErrorCode::CoreOverBudget,
            PackError::Io { .. } | PackError::Other(_) => ReportErrorCode::Unknown,
        }
    }

    /// Underlying cause chain, when there is one worth persisting.
    pub fn details(&self) -> Option<String> {
        match self {
            PackError::Io { source, .. } => Some(format!("{:?}", source.kind())),
            _ => None,
        }
    }
}
