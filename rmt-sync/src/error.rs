//! Error type for sync runs.

use std::path::PathBuf;

use rmt_types::ValidationError;
use thiserror::Error;

use crate::base::BaseError;
use crate::ports::{ToolError, TransferError};

/// Sync operation errors.
///
/// Any of these aborts the run. Work already applied stays applied and
/// remains consistent: every completed path has its base updated.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Moving content to or from the remote failed.
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Diff or merge tool gave an uninterpretable result.
    #[error("comparison tool failed: {0}")]
    Tool(#[from] ToolError),

    /// Reading or writing the base cache failed.
    #[error(transparent)]
    Base(#[from] BaseError),

    /// A relative path did not map into the mount.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Local filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mount's local directory is gone or is not a directory.
    #[error("local directory {} is missing", .0.display())]
    MissingLocalRoot(PathBuf),
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_display() {
        let err = SyncError::MissingLocalRoot(PathBuf::from("/home/u/proj"));
        assert_eq!(err.to_string(), "local directory /home/u/proj is missing");
    }

    #[test]
    fn tool_error_converts() {
        let err: SyncError = ToolError::UnexpectedExit {
            tool: "comp".into(),
            code: Some(3),
            stderr: String::new(),
        }
        .into();
        assert!(matches!(err, SyncError::Tool(_)));
    }
}
