//! Error types for the sync cycle.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can abort a sync cycle.
///
/// Every variant is recoverable from the scheduler's point of view: the
/// cycle is abandoned, the last synced revision is left untouched and the
/// next tick retries from scratch.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to load sync settings: {0}")]
    ConfigFetch(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetwork(String),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Git operation timed out after {0}s")]
    GitTimeout(u64),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl SyncError {
    /// Returns true if the error came from the repository transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::GitOperation(_)
                | SyncError::GitNetwork(_)
                | SyncError::GitAuthFailed(_)
                | SyncError::GitTimeout(_)
        )
    }

    /// Returns true if the error is likely transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::GitNetwork(_) | SyncError::GitTimeout(_))
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SyncError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> SyncError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return SyncError::GitNetwork(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return SyncError::GitAuthFailed(stderr.trim().to_string());
    }

    SyncError::GitOperation(stderr.trim().to_string())
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
