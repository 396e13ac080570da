//! # rmt-types
//!
//! Foundational types shared by every rmt crate:
//! - [`RemoteSpec`] - a parsed `[user@]host:path` remote location
//! - [`MountRecord`] - one local↔remote pairing as stored in the registry
//! - [`ValidationError`] - rejected user input

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod mount;
mod remote;

pub use error::ValidationError;
pub use mount::{unix_now, MountRecord};
pub use remote::RemoteSpec;

/// Name of the per-mount directory holding base snapshots.
///
/// Excluded from every tree walk and every transfer, local and remote.
pub const BASE_DIR_NAME: &str = ".rmt-base";
