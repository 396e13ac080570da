//! # rmt-sync
//!
//! The sync engine behind `rmt`.
//!
//! ## Features
//!
//! - **Three-way sync**: every file is compared against its base snapshot
//!   and pushed, pulled, merged or deleted accordingly
//! - **Conflict halt**: an unresolvable merge stops the run with everything
//!   before it applied and everything after it untouched
//! - **Tool ports**: transfer, remote exec, diff and merge go through
//!   narrow traits (subprocess or in-process)
//! - **Mount registry**: lock-protected JSON store of local↔remote pairings
//!
//! ## Example
//!
//! ```ignore
//! use rmt_sync::{ports::mock::{DirRemote, MockDiff, MockMerge}, SyncOptions, Syncer};
//!
//! let remote = DirRemote::new("/tmp/remote");
//! let syncer = Syncer::new(remote.clone(), remote, MockDiff::new(), MockMerge::new());
//! let outcome = syncer.sync(local_root, &spec, SyncOptions::default()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod base;
pub mod error;
pub mod ports;
pub mod registry;
pub mod syncer;
pub mod tree;

pub use base::{BaseCache, BaseError};
pub use error::SyncError;
pub use ports::{
    Comparison, DiffOracle, MergeOracle, MergeOutcome, RemoteExec, ToolError, Transfer,
    TransferError,
};
pub use registry::{resolve_local_path, MountTable, Registry, RegistryError, MAX_MOUNTS};
pub use syncer::{PlannedAction, SyncOptions, SyncOutcome, Syncer};
