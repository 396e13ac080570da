//! Directory walking and file placement helpers.
//!
//! Relative paths are `/`-separated UTF-8 strings, the same form on the
//! local side, in the fetched remote snapshot and in the base cache.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use rmt_types::{ValidationError, BASE_DIR_NAME};
use walkdir::WalkDir;

/// Sorted relative paths of every regular file below `root`.
///
/// Directories named [`BASE_DIR_NAME`] are skipped at every depth.
/// Symlinks and special files are ignored. A missing `root` yields an
/// empty list; any other I/O error is returned, since a partially read tree
/// would look like deleted files.
pub fn walk_files(root: &Path) -> io::Result<Vec<String>> {
    walk_files_excluding(root, &[BASE_DIR_NAME])
}

/// Like [`walk_files`] with an explicit list of directory names to skip.
pub fn walk_files_excluding(root: &Path, exclude: &[&str]) -> io::Result<Vec<String>> {
    match fs::symlink_metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(Vec::new()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| exclude.contains(&name)))
        });

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        out.push(rel_string(root, entry.path())?);
    }
    out.sort();
    Ok(out)
}

/// `/`-joined relative path of `path` below `root`.
fn rel_string(root: &Path, path: &Path) -> io::Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("non UTF-8 file name in {}", path.display()),
            )
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Join a relative path onto a root, refusing anything that could escape it.
pub fn join_rel(root: &Path, rel: &str) -> Result<PathBuf, ValidationError> {
    let candidate = Path::new(rel);
    let mut joined = root.to_path_buf();
    let mut depth = 0;
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => return Err(ValidationError::RelativePath(rel.to_string())),
        }
    }
    if depth == 0 {
        return Err(ValidationError::RelativePath(rel.to_string()));
    }
    Ok(joined)
}

/// Parent directory of a relative path, if it has one (`a/b/c.txt` → `a/b`).
pub fn rel_parent(rel: &str) -> Option<&str> {
    rel.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

/// Whether `path` is a regular file (symlinks are not followed).
pub fn is_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Copy `src` over `dst` so that `dst` is either the old or the new content,
/// never a partial write.
///
/// The bytes go to a temporary file in `staging`, which is then renamed
/// over `dst`. `staging` must be on the same filesystem as
/// `dst`. Parent directories of `dst` are created; permissions of `src` are
/// carried over.
pub fn copy_atomic(src: &Path, dst: &Path, staging: &Path) -> io::Result<()> {
    let parent = dst.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", dst.display()),
        )
    })?;
    fs::create_dir_all(parent)?;
    fs::create_dir_all(staging)?;

    let mut input = File::open(src)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".rmt-tmp-")
        .tempfile_in(staging)?;
    io::copy(&mut input, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), input.metadata()?.permissions())?;
    tmp.persist(dst).map_err(|e| e.error)?;
    Ok(())
}
