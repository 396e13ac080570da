//! Base cache: the last-synced content of every file in a mount.
//!
//! Snapshots live at `<mount>/.rmt-base/<relative-path>` and serve as the
//! common ancestor for three-way classification and merging. A snapshot
//! exists only for paths captured at a successful sync point.
//!
//! ```text
//! <mount>/
//! ├─ notes/todo.txt
//! └─ .rmt-base/
//!    ├─ .rmt-staging/     # temp files, renamed into place
//!    └─ notes/todo.txt    # snapshot of notes/todo.txt
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rmt_types::{ValidationError, BASE_DIR_NAME};
use thiserror::Error;

use crate::tree;

/// Directory inside the base tree holding in-flight snapshot writes.
const STAGING_DIR: &str = ".rmt-staging";

/// Base cache errors.
#[derive(Debug, Error)]
pub enum BaseError {
    /// Relative path could not be mapped into the base tree.
    #[error(transparent)]
    InvalidPath(#[from] ValidationError),

    /// Filesystem operation on a snapshot failed.
    #[error("base cache {op} failed for '{rel}': {source}")]
    Io {
        /// Operation being performed.
        op: &'static str,
        /// Relative path (empty for whole-tree operations).
        rel: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl BaseError {
    fn io(op: &'static str, rel: &str, source: io::Error) -> Self {
        Self::Io {
            op,
            rel: rel.to_string(),
            source,
        }
    }
}

/// Handle on one mount's base tree.
#[derive(Debug, Clone)]
pub struct BaseCache {
    root: PathBuf,
    dir: PathBuf,
}

impl BaseCache {
    /// Base cache of the mount rooted at `mount_root`.
    pub fn new(mount_root: &Path) -> Self {
        Self {
            root: mount_root.to_path_buf(),
            dir: mount_root.join(BASE_DIR_NAME),
        }
    }

    /// The `.rmt-base` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staging directory for atomic writes into the mount. It sits on the
    /// mount's filesystem and is never walked.
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    /// Where the snapshot of `rel` lives.
    pub fn path_for(&self, rel: &str) -> Result<PathBuf, BaseError> {
        Ok(tree::join_rel(&self.dir, rel)?)
    }

    /// Whether a snapshot exists for `rel`.
    pub fn contains(&self, rel: &str) -> bool {
        self.path_for(rel)
            .map(|path| tree::is_file(&path))
            .unwrap_or(false)
    }

    /// Every path with a snapshot, sorted.
    pub fn paths(&self) -> Result<Vec<String>, BaseError> {
        tree::walk_files_excluding(&self.dir, &[BASE_DIR_NAME, STAGING_DIR])
            .map_err(|e| BaseError::io("list", "", e))
    }

    /// Snapshot `src` as the new base content of `rel`.
    ///
    /// The bytes are staged inside the base tree and renamed into place, so
    /// a reader sees either the previous snapshot or the new one.
    pub fn update(&self, rel: &str, src: &Path) -> Result<(), BaseError> {
        let target = self.path_for(rel)?;
        tree::copy_atomic(src, &target, &self.staging_dir())
            .map_err(|e| BaseError::io("update", rel, e))
    }

    /// Drop the snapshot of `rel`. Succeeds if there was none.
    ///
    /// Directories left empty inside the base tree are pruned.
    pub fn remove(&self, rel: &str) -> Result<(), BaseError> {
        let target = self.path_for(rel)?;
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BaseError::io("remove", rel, e)),
        }

        let mut dir = target.parent();
        while let Some(current) = dir {
            if current == self.dir || !current.starts_with(&self.dir) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    /// Reset the base tree to mirror the current local tree.
    ///
    /// Used right after a mount and after one-way refreshes, where local and
    /// remote are known to match and the old ancestor no longer applies.
    /// Returns the number of snapshots written.
    pub fn initialize(&self) -> Result<usize, BaseError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BaseError::io("clear", "", e)),
        }
        fs::create_dir_all(&self.dir).map_err(|e| BaseError::io("create", "", e))?;

        let files = tree::walk_files(&self.root).map_err(|e| BaseError::io("scan", "", e))?;
        for rel in &files {
            let src = tree::join_rel(&self.root, rel)?;
            self.update(rel, &src)?;
        }
        tracing::debug!(
            "Base cache initialised at {} ({} files)",
            self.dir.display(),
            files.len()
        );
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn path_for_maps_into_reserved_dir() {
        let base = BaseCache::new(Path::new("/m"));
        assert_eq!(
            base.path_for("a/b.txt").unwrap(),
            PathBuf::from("/m/.rmt-base/a/b.txt")
        );
        assert!(base.path_for("../x").is_err());
    }

    #[test]
    fn update_then_contains() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a/b.txt", "v1");
        let base = BaseCache::new(dir.path());

        assert!(!base.contains("a/b.txt"));
        base.update("a/b.txt", &dir.path().join("a/b.txt")).unwrap();
        assert!(base.contains("a/b.txt"));
        assert_eq!(
            fs::read_to_string(base.path_for("a/b.txt").unwrap()).unwrap(),
            "v1"
        );
    }

    #[test]
    fn update_overwrites_and_leaves_no_staging_entries() {
        let dir = tempdir().unwrap();
        let base = BaseCache::new(dir.path());
        write(dir.path(), "f", "one");
        base.update("f", &dir.path().join("f")).unwrap();
        write(dir.path(), "f", "two");
        base.update("f", &dir.path().join("f")).unwrap();

        assert_eq!(
            fs::read_to_string(base.path_for("f").unwrap()).unwrap(),
            "two"
        );
        assert_eq!(base.paths().unwrap(), vec!["f"]);
    }

    #[test]
    fn remove_is_idempotent_and_prunes() {
        let dir = tempdir().unwrap();
        write(dir.path(), "x/y/z.txt", "z");
        let base = BaseCache::new(dir.path());
        base.update("x/y/z.txt", &dir.path().join("x/y/z.txt")).unwrap();

        base.remove("x/y/z.txt").unwrap();
        base.remove("x/y/z.txt").unwrap();
        assert!(!base.contains("x/y/z.txt"));
        assert!(!base.dir().join("x").exists());
        assert!(base.dir().exists());
    }

    #[test]
    fn initialize_mirrors_local_tree() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "d/b.txt", "b");
        let base = BaseCache::new(dir.path());

        // Stale entry from an earlier state must disappear.
        write(dir.path(), ".rmt-base/old.txt", "old");

        assert_eq!(base.initialize().unwrap(), 2);
        assert_eq!(base.paths().unwrap(), vec!["a.txt", "d/b.txt"]);
        assert_eq!(
            fs::read_to_string(base.path_for("d/b.txt").unwrap()).unwrap(),
            "b"
        );
    }

    #[test]
    fn paths_of_fresh_mount_is_empty() {
        let dir = tempdir().unwrap();
        assert!(BaseCache::new(dir.path()).paths().unwrap().is_empty());
    }
}
