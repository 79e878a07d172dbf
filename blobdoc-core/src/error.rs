use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocError>;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A single stale-version rejection from the blob API. The retry policy
    /// consumes these; callers only ever see [`DocError::Conflict`].
    #[error("version mismatch on {path}")]
    VersionMismatch { path: String },

    #[error("conflict on {path}: version check failed after {attempts} attempts")]
    Conflict { path: String, attempts: u32 },

    #[error("malformed document at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("transport failure: {message}")]
    Transport {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("split write of {path} failed for {} of {total} chunks: {}", .failed.len(), describe_failures(.failed))]
    PartialSplitFailure {
        path: String,
        total: usize,
        failed: Vec<ChunkFailure>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One failed chunk write inside a [`DocError::PartialSplitFailure`].
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub physical_path: String,
    pub chunk_index: usize,
    pub reason: String,
}

fn describe_failures(failed: &[ChunkFailure]) -> String {
    failed
        .iter()
        .map(|failure| format!("#{} ({})", failure.chunk_index, failure.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl DocError {
    pub fn malformed(path: impl Into<String>, reason: impl ToString) -> Self {
        DocError::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        DocError::Transport {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, DocError::VersionMismatch { .. })
    }

    /// Whether re-issuing the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DocError::Conflict { .. }
                | DocError::VersionMismatch { .. }
                | DocError::Transport { .. }
                | DocError::PartialSplitFailure { .. }
        )
    }

    /// Backoff hint attached to transport failures.
    pub fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            DocError::Transport { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
