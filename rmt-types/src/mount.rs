//! Mount records as persisted in the registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::RemoteSpec;

/// One local directory paired with one remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    /// Canonical absolute local directory. Unique within a registry.
    pub local_path: PathBuf,
    /// Remote side of the pairing.
    pub remote: RemoteSpec,
    /// When the mount was created (Unix seconds).
    pub mounted_at: u64,
    /// When the last completed, non-dry-run sync finished (Unix seconds).
    pub last_sync: u64,
}

impl MountRecord {
    /// Create a record stamped with the current time.
    pub fn new(local_path: PathBuf, remote: RemoteSpec) -> Self {
        let now = unix_now();
        Self {
            local_path,
            remote,
            mounted_at: now,
            last_sync: now,
        }
    }

    /// Record a completed sync.
    pub fn touch_sync(&mut self) {
        self.last_sync = unix_now();
    }
}

/// Current time in Unix seconds (0 if the clock is before the epoch).
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
