//! In-process port implementations for testing.
//!
//! - [`DirRemote`]: a local directory standing in for the remote host
//! - [`MockDiff`]: byte comparison that records every pair it compares
//! - [`MockMerge`]: line-aligned three-way merge with scripted overrides
//!
//! All of them can be told to fail their next call, and share state across
//! clones so a test can keep a handle after moving one into a `Syncer`.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rmt_types::RemoteSpec;

use super::{
    Comparison, DiffOracle, MergeOracle, MergeOutcome, RemoteExec, ToolError, Transfer,
    TransferError,
};
use crate::tree;

/// One call made against a [`DirRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// Whole-tree fetch.
    FetchTree {
        /// Whether it was a dry run.
        dry_run: bool,
    },
    /// Whole-tree publish.
    PublishTree {
        /// Whether it was a dry run.
        dry_run: bool,
    },
    /// Single file upload.
    PushFile(String),
    /// Remote `mkdir -p`.
    CreateDir(String),
    /// Remote `rm -f`.
    RemoveFile(String),
}

impl RemoteCall {
    /// Whether the call changes the remote.
    pub fn is_write(&self) -> bool {
        match self {
            Self::FetchTree { .. } => false,
            Self::PublishTree { dry_run } => !dry_run,
            Self::PushFile(_) | Self::CreateDir(_) | Self::RemoveFile(_) => true,
        }
    }
}

/// A directory acting as the remote end of a mount.
///
/// The remote spec's path is ignored: every spec maps to `root`.
#[derive(Debug, Clone)]
pub struct DirRemote {
    root: PathBuf,
    inner: Arc<Mutex<DirRemoteInner>>,
}

#[derive(Debug, Default)]
struct DirRemoteInner {
    calls: Vec<RemoteCall>,
    fail_next: Option<String>,
}

impl DirRemote {
    /// Serve `root` as the remote tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            inner: Arc::default(),
        }
    }

    /// The directory holding the remote tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Calls that changed the remote.
    pub fn writes(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_write).collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Cause the next call (of any kind) to fail with the given message.
    pub fn fail_next(&self, error: &str) {
        self.inner.lock().unwrap().fail_next = Some(error.to_string());
    }

    fn begin(&self, call: RemoteCall) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        let target = format!("{:?}", call);
        inner.calls.push(call);
        if let Some(stderr) = inner.fail_next.take() {
            return Err(TransferError::Failed {
                tool: "dir-remote".into(),
                target,
                code: Some(1),
                stderr,
            });
        }
        Ok(())
    }
}

/// Copy every file from `src` into `dst` whose content differs, returning
/// the paths copied (or that would be copied).
fn mirror(src: &Path, dst: &Path, dry_run: bool) -> Result<Vec<String>, TransferError> {
    let mut copied = Vec::new();
    for rel in tree::walk_files(src)? {
        let from = src.join(&rel);
        let to = dst.join(&rel);
        if tree::is_file(&to) && fs::read(&from)? == fs::read(&to)? {
            continue;
        }
        if !dry_run {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)?;
        }
        copied.push(rel);
    }
    Ok(copied)
}

fn invalid(rel: &str) -> TransferError {
    TransferError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("bad relative path {}", rel),
    ))
}

#[async_trait]
impl Transfer for DirRemote {
    async fn fetch_tree(
        &self,
        _remote: &RemoteSpec,
        dest: &Path,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError> {
        self.begin(RemoteCall::FetchTree { dry_run })?;
        mirror(&self.root, dest, dry_run)
    }

    async fn publish_tree(
        &self,
        src: &Path,
        _remote: &RemoteSpec,
        dry_run: bool,
    ) -> Result<Vec<String>, TransferError> {
        self.begin(RemoteCall::PublishTree { dry_run })?;
        mirror(src, &self.root, dry_run)
    }

    async fn push_file(
        &self,
        src: &Path,
        _remote: &RemoteSpec,
        rel: &str,
    ) -> Result<(), TransferError> {
        self.begin(RemoteCall::PushFile(rel.to_string()))?;
        let target = tree::join_rel(&self.root, rel).map_err(|_| invalid(rel))?;
        // Like rsync, a single-file copy does not create parent directories.
        if !target.parent().map(Path::is_dir).unwrap_or(false) {
            return Err(TransferError::Failed {
                tool: "dir-remote".into(),
                target: rel.to_string(),
                code: Some(3),
                stderr: "remote parent directory missing".into(),
            });
        }
        fs::copy(src, target)?;
        Ok(())
    }
}

#[async_trait]
impl RemoteExec for DirRemote {
    async fn create_dir_all(
        &self,
        _remote: &RemoteSpec,
        rel_dir: &str,
    ) -> Result<(), TransferError> {
        self.begin(RemoteCall::CreateDir(rel_dir.to_string()))?;
        let dir = tree::join_rel(&self.root, rel_dir).map_err(|_| invalid(rel_dir))?;
        fs::create_dir_all(dir)?;
        Ok(())
    }

    async fn remove_file(&self, _remote: &RemoteSpec, rel: &str) -> Result<(), TransferError> {
        self.begin(RemoteCall::RemoveFile(rel.to_string()))?;
        let path = tree::join_rel(&self.root, rel).map_err(|_| invalid(rel))?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Byte-comparing diff oracle.
#[derive(Debug, Clone, Default)]
pub struct MockDiff {
    inner: Arc<Mutex<MockDiffInner>>,
}

#[derive(Debug, Default)]
struct MockDiffInner {
    compared: Vec<(PathBuf, PathBuf)>,
    fail_next: bool,
}

impl MockDiff {
    /// Create a new diff oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pair compared so far, in order.
    pub fn compared(&self) -> Vec<(PathBuf, PathBuf)> {
        self.inner.lock().unwrap().compared.clone()
    }

    /// Forget recorded comparisons.
    pub fn clear(&self) {
        self.inner.lock().unwrap().compared.clear();
    }

    /// Cause the next comparison to report an unexpected exit status.
    pub fn fail_next(&self) {
        self.inner.lock().unwrap().fail_next = true;
    }
}

#[async_trait]
impl DiffOracle for MockDiff {
    async fn compare(&self, a: &Path, b: &Path) -> Result<Comparison, ToolError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.compared.push((a.to_path_buf(), b.to_path_buf()));
            if std::mem::take(&mut inner.fail_next) {
                return Err(ToolError::UnexpectedExit {
                    tool: "mock-diff".into(),
                    code: Some(2),
                    stderr: "forced failure".into(),
                });
            }
        }
        if fs::read(a)? == fs::read(b)? {
            Ok(Comparison::Identical)
        } else {
            Ok(Comparison::Different)
        }
    }
}

/// Scripted result for the next [`MockMerge`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedMerge {
    /// Write these bytes and report a clean merge.
    Clean(Vec<u8>),
    /// Write these bytes and report a conflict.
    Conflict(Vec<u8>),
    /// Report an unexpected exit status without writing output.
    Fail,
}

/// Three-way merge oracle.
///
/// Without a script it merges line by line when base, ours and theirs have
/// the same number of lines, and falls back to whole-file resolution
/// otherwise. Regions changed differently on both sides are wrapped in
/// `<<<<<<< ours` / `=======` / `>>>>>>> theirs` markers.
#[derive(Debug, Clone, Default)]
pub struct MockMerge {
    inner: Arc<Mutex<MockMergeInner>>,
}

#[derive(Debug, Default)]
struct MockMergeInner {
    script: VecDeque<ScriptedMerge>,
    calls: Vec<(PathBuf, PathBuf, PathBuf)>,
}

impl MockMerge {
    /// Create a new merge oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted result for a future call.
    pub fn queue(&self, result: ScriptedMerge) {
        self.inner.lock().unwrap().script.push_back(result);
    }

    /// `(base, ours, theirs)` of every call so far.
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
        self.inner.lock().unwrap().calls.clone()
    }
}

/// Pick a side when at most one changed; `None` when both changed differently.
fn resolve<'a, T: PartialEq + ?Sized>(base: &'a T, ours: &'a T, theirs: &'a T) -> Option<&'a T> {
    if ours == theirs || theirs == base {
        Some(ours)
    } else if ours == base {
        Some(theirs)
    } else {
        None
    }
}

fn conflict_block(out: &mut Vec<u8>, ours: &[u8], theirs: &[u8]) {
    out.extend_from_slice(b"<<<<<<< ours\n");
    out.extend_from_slice(ours);
    if !ours.is_empty() && !ours.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b"=======\n");
    out.extend_from_slice(theirs);
    if !theirs.is_empty() && !theirs.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b">>>>>>> theirs\n");
}

fn lines(bytes: &[u8]) -> Vec<&[u8]> {
    bytes.split_inclusive(|b| *b == b'\n').collect()
}

/// Merge three versions, returning the output and whether it conflicted.
fn merge_bytes(base: &[u8], ours: &[u8], theirs: &[u8]) -> (Vec<u8>, bool) {
    if let Some(winner) = resolve(base, ours, theirs) {
        return (winner.to_vec(), false);
    }

    let (b, o, t) = (lines(base), lines(ours), lines(theirs));
    let mut out = Vec::new();
    if b.len() != o.len() || b.len() != t.len() {
        conflict_block(&mut out, ours, theirs);
        return (out, true);
    }

    let mut conflicted = false;
    for i in 0..b.len() {
        match resolve(b[i], o[i], t[i]) {
            Some(line) => out.extend_from_slice(line),
            None => {
                conflicted = true;
                conflict_block(&mut out, o[i], t[i]);
            }
        }
    }
    (out, conflicted)
}

#[async_trait]
impl MergeOracle for MockMerge {
    async fn merge(
        &self,
        base: &Path,
        ours: &Path,
        theirs: &Path,
        out: &Path,
    ) -> Result<MergeOutcome, ToolError> {
        let scripted = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .calls
                .push((base.to_path_buf(), ours.to_path_buf(), theirs.to_path_buf()));
            inner.script.pop_front()
        };

        match scripted {
            Some(ScriptedMerge::Clean(bytes)) => {
                fs::write(out, bytes)?;
                Ok(MergeOutcome::Clean)
            }
            Some(ScriptedMerge::Conflict(bytes)) => {
                fs::write(out, bytes)?;
                Ok(MergeOutcome::Conflict)
            }
            Some(ScriptedMerge::Fail) => Err(ToolError::UnexpectedExit {
                tool: "mock-merge".into(),
                code: Some(2),
                stderr: "forced failure".into(),
            }),
            None => {
                let (merged, conflicted) =
                    merge_bytes(&fs::read(base)?, &fs::read(ours)?, &fs::read(theirs)?);
                fs::write(out, merged)?;
                Ok(if conflicted {
                    MergeOutcome::Conflict
                } else {
                    MergeOutcome::Clean
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spec() -> RemoteSpec {
        RemoteSpec::parse("host:/data").unwrap()
    }

    #[test]
    fn merge_bytes_disjoint_lines_is_clean() {
        let (out, conflicted) = merge_bytes(b"a\nb\nc\n", b"A\nb\nc\n", b"a\nb\nC\n");
        assert!(!conflicted);
        assert_eq!(out, b"A\nb\nC\n");
    }

    #[test]
    fn merge_bytes_overlapping_lines_conflict() {
        let (out, conflicted) = merge_bytes(b"a\nb\n", b"x\nb\n", b"y\nb\n");
        assert!(conflicted);
        assert_eq!(out, b"<<<<<<< ours\nx\n=======\ny\n>>>>>>> theirs\nb\n");
    }

    #[test]
    fn merge_bytes_identical_edits_are_clean() {
        let (out, conflicted) = merge_bytes(b"a\n", b"same\nlonger\n", b"same\nlonger\n");
        assert!(!conflicted);
        assert_eq!(out, b"same\nlonger\n");
    }

    #[test]
    fn merge_bytes_length_change_on_both_sides_conflicts() {
        let (out, conflicted) = merge_bytes(b"a\n", b"a\nb\n", b"c\n");
        assert!(conflicted);
        assert!(out.starts_with(b"<<<<<<< ours\n"));
    }

    #[tokio::test]
    async fn push_file_requires_parent() {
        let dir = tempdir().unwrap();
        let remote = DirRemote::new(dir.path().join("remote"));
        fs::create_dir_all(remote.root()).unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "x").unwrap();

        assert!(remote.push_file(&src, &spec(), "sub/x.txt").await.is_err());
        remote.create_dir_all(&spec(), "sub").await.unwrap();
        remote.push_file(&src, &spec(), "sub/x.txt").await.unwrap();
        assert_eq!(
            fs::read_to_string(remote.root().join("sub/x.txt")).unwrap(),
            "x"
        );
    }

    #[tokio::test]
    async fn fail_next_fails_once() {
        let dir = tempdir().unwrap();
        let remote = DirRemote::new(dir.path());
        remote.fail_next("boom");
        assert!(remote.remove_file(&spec(), "a").await.is_err());
        assert!(remote.remove_file(&spec(), "a").await.is_ok());
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn fetch_tree_reports_changed_files_only() {
        let dir = tempdir().unwrap();
        let remote = DirRemote::new(dir.path().join("r"));
        fs::create_dir_all(remote.root().join("d")).unwrap();
        fs::write(remote.root().join("d/a"), "a").unwrap();
        fs::write(remote.root().join("b"), "b").unwrap();
        let dest = dir.path().join("l");

        let dry = remote.fetch_tree(&spec(), &dest, true).await.unwrap();
        assert_eq!(dry, vec!["b", "d/a"]);
        assert!(!dest.exists());

        remote.fetch_tree(&spec(), &dest, false).await.unwrap();
        let again = remote.fetch_tree(&spec(), &dest, false).await.unwrap();
        assert!(again.is_empty());
        assert!(remote.writes().is_empty());
    }

    #[tokio::test]
    async fn mock_diff_records_and_fails_on_demand() {
        let dir = tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        fs::write(&a, "1").unwrap();
        fs::write(&b, "2").unwrap();

        let diff = MockDiff::new();
        assert_eq!(diff.compare(&a, &a).await.unwrap(), Comparison::Identical);
        assert_eq!(diff.compare(&a, &b).await.unwrap(), Comparison::Different);
        diff.fail_next();
        assert!(diff.compare(&a, &b).await.is_err());
        assert_eq!(diff.compared().len(), 3);
    }

    #[tokio::test]
    async fn scripted_merge_takes_priority() {
        let dir = tempdir().unwrap();
        let f = dir.path().join("f");
        let out = dir.path().join("out");
        fs::write(&f, "x").unwrap();

        let merge = MockMerge::new();
        merge.queue(ScriptedMerge::Conflict(b"markers".to_vec()));
        assert_eq!(
            merge.merge(&f, &f, &f, &out).await.unwrap(),
            MergeOutcome::Conflict
        );
        assert_eq!(fs::read(&out).unwrap(), b"markers");
        assert_eq!(
            merge.merge(&f, &f, &f, &out).await.unwrap(),
            MergeOutcome::Clean
        );
    }
}
