//! Ports to the external tools a sync depends on.
//!
//! The orchestrator never builds command lines. It talks to four narrow
//! traits, each with typed results:
//!
//! - [`Transfer`]: mirror whole trees and copy single files to the remote
//! - [`RemoteExec`]: create directories and delete files on the remote
//! - [`DiffOracle`]: are two files identical?
//! - [`MergeOracle`]: three-way merge of base/ours/theirs
//!
//! [`process`] implements them by spawning `rsync`, `ssh` and `comp`;
//! [`mock`] implements them in-process for tests.
//!
//! # Exit codes
//!
//! Tools report through their exit status. Transfer and remote exec know
//! only success (0) and failure. The oracles have three outcomes:
//!
//! | tool  | 0         | 1         | other         |
//! |-------|-----------|-----------|---------------|
//! | diff  | identical | different | [`ToolError`] |
//! | merge | clean     | conflict  | [`ToolError`] |

pub mod mock;
pub mod process;

use std::io;
use std::path::Path;

use async_trait::async_trait;
use rmt_types::RemoteSpec;
use thiserror::Error;

/// Failure of a transfer or remote-exec call.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The tool could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Program that failed to start.
        tool: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} failed for {target} (exit {}): {stderr}", display_code(.code))]
    Failed {
        /// Program that failed.
        tool: String,
        /// What it was operating on.
        target: String,
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// Local I/O failed while staging a transfer.
    #[error("transfer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A diff or merge tool returned something that cannot be interpreted.
///
/// Never recovered from: continuing past an unknown result risks
/// corrupting content.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Program that failed to start.
        tool: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Exit status outside the tool's contract.
    #[error("{tool} exited with unexpected status {}: {stderr}", display_code(.code))]
    UnexpectedExit {
        /// Program that misbehaved.
        tool: String,
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// In-process oracle failed on local I/O.
    #[error("oracle I/O error: {0}")]
    Io(#[from] io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Result of comparing two files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Byte-for-byte the same.
    Identical,
    /// Contents differ.
    Different,
}

impl Comparison {
    /// Interpret a diff tool's exit code.
    pub fn from_exit_code(code: Option<i32>) -> Option<Self> {
        match code {
            Some(0) => Some(Self::Identical),
            Some(1) => Some(Self::Different),
            _ => None,
        }
    }

    /// Whether the files differ.
    pub fn is_different(&self) -> bool {
        matches!(self, Self::Different)
    }
}

/// Result of a three-way merge. In both cases the output file was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Output holds the merged content.
    Clean,
    /// Output holds inline conflict markers.
    Conflict,
}

impl MergeOutcome {
    /// Interpret a merge tool's exit code.
    pub fn from_exit_code(code: Option<i32>) -> Option<Self> {
        match code {
            Some(0) => Some(Self::Clean),
            Some(1) => Some(Self::Conflict),
            _ => None,
        }
    }
}

/// Moves file content between the local machine and the remote.
///
/// Every tree operation excludes the base cache directory.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Mirror the remote tree into `dest` (without deleting extra files).
    ///
    /// With `dry_run` nothing is written. Returns the relative paths that
    /// were (or would be) transferred.
    async fn fetch_tree(
        &self,
        remote: &RemoteSpec,
        dest: &Path,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError>;

    /// Mirror the local tree at `src` onto the remote (without deleting extra
    /// files). Same return and dry-run contract as [`Transfer::fetch_tree`].
    async fn publish_tree(
        &self,
        src: &Path,
        remote: &RemoteSpec,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError>;

    /// Copy one local file to `rel` below the remote root.
    ///
    /// The remote parent directory must already exist.
    async fn push_file(
        &self,
        src: &Path,
        remote: &RemoteSpec,
        rel: &str,
    ) -> Result<(), TransferError>;
}

/// Runs the few remote commands a sync needs.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// `mkdir -p` of `rel_dir` below the remote root.
    async fn create_dir_all(&self, remote: &RemoteSpec, rel_dir: &str)
        -> Result<(), TransferError>;

    /// `rm -f` of `rel` below the remote root. Succeeds if already absent.
    async fn remove_file(&self, remote: &RemoteSpec, rel: &str) -> Result<(), TransferError>;
}

/// Compares two local files.
#[async_trait]
pub trait DiffOracle: Send + Sync {
    /// Compare `a` with `b`.
    async fn compare(&self, a: &Path, b: &Path) -> Result<Comparison, ToolError>;
}

/// Merges two edits of a file against their common ancestor.
#[async_trait]
pub trait MergeOracle: Send + Sync {
    /// Merge `ours` and `theirs` relative to `base`, writing the result to
    /// `out` in both the clean and the conflict case.
    async fn merge(
        &self,
        base: &Path,
        ours: &Path,
        theirs: &Path,
        out: &Path,
    ) -> Result<MergeOutcome, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_exit_codes() {
        assert_eq!(Comparison::from_exit_code(Some(0)), Some(Comparison::Identical));
        assert_eq!(Comparison::from_exit_code(Some(1)), Some(Comparison::Different));
        assert_eq!(Comparison::from_exit_code(Some(2)), None);
        assert_eq!(Comparison::from_exit_code(None), None);
    }

    #[test]
    fn merge_exit_codes() {
        assert_eq!(MergeOutcome::from_exit_code(Some(0)), Some(MergeOutcome::Clean));
        assert_eq!(MergeOutcome::from_exit_code(Some(1)), Some(MergeOutcome::Conflict));
        assert_eq!(MergeOutcome::from_exit_code(Some(127)), None);
        assert_eq!(MergeOutcome::from_exit_code(None), None);
    }

    #[test]
    fn error_display() {
        let err = ToolError::UnexpectedExit {
            tool: "comp".into(),
            code: Some(2),
            stderr: "bad input".into(),
        };
        assert_eq!(
            err.to_string(),
            "comp exited with unexpected status 2: bad input"
        );

        let err = TransferError::Failed {
            tool: "rsync".into(),
            target: "h:/data/a.txt".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("exit signal"));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransferError>();
        assert_send_sync::<ToolError>();
    }
}
