//! Mount registry: the persisted set of local↔remote pairings.
//!
//! ```text
//! <data-dir>/
//! ├─ registry.json   # {"version": 1, "mounts": [...]}
//! └─ registry.lock   # advisory lock (shared for load, exclusive for save)
//! ```
//!
//! The lock lives in its own file so `registry.json` can be replaced by
//! rename while a lock is held.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use fs2::FileExt;
use rmt_types::MountRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Most mounts a registry holds.
pub const MAX_MOUNTS: usize = 32;

const REGISTRY_VERSION: u32 = 1;
const REGISTRY_FILE: &str = "registry.json";
const LOCK_FILE: &str = "registry.lock";

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The advisory lock could not be taken.
    #[error("failed to lock registry {}: {source}", .path.display())]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The registry file could not be read.
    #[error("failed to read registry {}: {source}", .path.display())]
    Read {
        /// Registry file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The registry file could not be written.
    #[error("failed to write registry {}: {source}", .path.display())]
    Write {
        /// Registry file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The registry file is not a registry at all.
    #[error("registry {} is corrupt: {source}", .path.display())]
    Corrupt {
        /// Registry file path.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },

    /// A mount already exists for this local directory.
    #[error("{} is already mounted", .0.display())]
    AlreadyMounted(PathBuf),

    /// The registry holds [`MAX_MOUNTS`] records.
    #[error("mount limit reached ({0} mounts)")]
    Full(usize),

    /// No mount exists for this local directory.
    #[error("{} is not mounted", .0.display())]
    NotMounted(PathBuf),
}

/// In-memory mount records, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    records: Vec<MountRecord>,
}

impl MountTable {
    /// All records, oldest first.
    pub fn records(&self) -> &[MountRecord] {
        &self.records
    }

    /// Iterate over the records.
    pub fn iter(&self) -> impl Iterator<Item = &MountRecord> {
        self.records.iter()
    }

    /// Number of mounts.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no mounts.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for an already-resolved local path.
    pub fn find(&self, local_path: &Path) -> Option<&MountRecord> {
        self.records.iter().find(|r| r.local_path == local_path)
    }

    /// Mutable record for an already-resolved local path.
    pub fn find_mut(&mut self, local_path: &Path) -> Option<&mut MountRecord> {
        self.records.iter_mut().find(|r| r.local_path == local_path)
    }

    /// Add a record.
    pub fn add(&mut self, record: MountRecord) -> Result<(), RegistryError> {
        if self.find(&record.local_path).is_some() {
            return Err(RegistryError::AlreadyMounted(record.local_path));
        }
        if self.records.len() >= MAX_MOUNTS {
            return Err(RegistryError::Full(MAX_MOUNTS));
        }
        self.records.push(record);
        Ok(())
    }

    /// Remove and return the record for `local_path`.
    pub fn remove(&mut self, local_path: &Path) -> Result<MountRecord, RegistryError> {
        let index = self
            .records
            .iter()
            .position(|r| r.local_path == local_path)
            .ok_or_else(|| RegistryError::NotMounted(local_path.to_path_buf()))?;
        Ok(self.records.remove(index))
    }
}

#[derive(Serialize)]
struct RegistryFileOut<'a> {
    version: u32,
    mounts: &'a [MountRecord],
}

#[derive(Deserialize)]
struct RegistryFileIn {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    mounts: Vec<serde_json::Value>,
}

/// Holds the registry lock until dropped.
struct LockGuard {
    file: File,
}

impl LockGuard {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self, RegistryError> {
        let lock_err = |source: io::Error| RegistryError::Lock {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;
        if exclusive {
            FileExt::lock_exclusive(&file).map_err(lock_err)?;
        } else {
            FileExt::lock_shared(&file).map_err(lock_err)?;
        }
        Ok(Self { file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// The registry on disk.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    /// Registry stored in `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into(),
        }
    }

    /// Path of the registry file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load every record under a shared lock.
    ///
    /// A missing file is an empty registry. Malformed or duplicate records
    /// are skipped with a warning.
    pub fn load(&self) -> Result<MountTable, RegistryError> {
        let _guard = LockGuard::acquire(&self.lock_path(), false)?;
        self.read_unlocked()
    }

    /// Replace the stored registry under an exclusive lock.
    pub fn save(&self, table: &MountTable) -> Result<(), RegistryError> {
        let _guard = LockGuard::acquire(&self.lock_path(), true)?;
        self.write_unlocked(table)
    }

    /// Load, modify and save under one exclusive lock.
    ///
    /// Nothing is written if `f` fails.
    pub fn update<T, E>(&self, f: impl FnOnce(&mut MountTable) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RegistryError>,
    {
        let _guard = LockGuard::acquire(&self.lock_path(), true)?;
        let mut table = self.read_unlocked()?;
        let value = f(&mut table)?;
        self.write_unlocked(&table)?;
        Ok(value)
    }

    /// Record for `path`, resolved with [`resolve_local_path`].
    pub fn find(&self, path: &Path) -> Result<Option<MountRecord>, RegistryError> {
        let resolved = resolve_local_path(path);
        Ok(self.load()?.find(&resolved).cloned())
    }

    /// Delete the registry file. Returns whether it existed.
    pub fn reset(&self) -> Result<bool, RegistryError> {
        let _guard = LockGuard::acquire(&self.lock_path(), true)?;
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(RegistryError::Write { path, source }),
        }
    }

    fn read_unlocked(&self) -> Result<MountTable, RegistryError> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MountTable::default()),
            Err(source) => return Err(RegistryError::Read { path, source }),
        };

        let file: RegistryFileIn = serde_json::from_str(&contents)
            .map_err(|source| RegistryError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if file.version != REGISTRY_VERSION {
            tracing::warn!(
                "Registry {} has version {}, expected {}",
                path.display(),
                file.version,
                REGISTRY_VERSION
            );
        }

        let mut table = MountTable::default();
        for (index, value) in file.mounts.into_iter().enumerate() {
            let record: MountRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping malformed registry record #{}: {}", index, e);
                    continue;
                }
            };
            if let Err(e) = table.add(record) {
                tracing::warn!("Skipping registry record #{}: {}", index, e);
            }
        }
        Ok(table)
    }

    fn write_unlocked(&self, table: &MountTable) -> Result<(), RegistryError> {
        let path = self.path();
        let write_err = |source: io::Error| RegistryError::Write {
            path: path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(&RegistryFileOut {
            version: REGISTRY_VERSION,
            mounts: table.records(),
        })
        .map_err(|e| write_err(e.into()))?;

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".registry-")
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        tracing::debug!("Saved {} mount(s) to {}", table.len(), path.display());
        Ok(())
    }
}

/// Resolve a user-supplied local path to the form stored in the registry.
///
/// Canonicalizes when the path exists. Otherwise the path is made absolute
/// against the current directory and `.`/`..` are resolved lexically.
pub fn resolve_local_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize_lexically(&absolute)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
