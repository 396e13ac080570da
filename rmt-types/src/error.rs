//! Validation errors for user-supplied input.

use thiserror::Error;

/// Input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Remote spec is not of the form `[user@]host:path`.
    #[error("invalid remote spec '{spec}': {reason} (expected [user@]host:/path)")]
    RemoteSpec {
        /// The rejected spec as given.
        spec: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Local path cannot be used as a mount point.
    #[error("invalid local path '{path}': {reason}")]
    LocalPath {
        /// The rejected path as given.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Relative path escapes the mount root or is otherwise unusable.
    #[error("invalid relative path '{0}'")]
    RelativePath(String),
}
