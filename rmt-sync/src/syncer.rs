//! Sync orchestrator.
//!
//! A run goes `fetch → classify → apply`:
//!
//! 1. The whole remote tree is mirrored into a scratch directory once.
//! 2. Every path seen locally, in the scratch copy or in the base cache is
//!    classified against its base snapshot.
//! 3. Actions are applied one file at a time in sorted path order. A merge
//!    conflict stops the run right there: paths before it are fully applied
//!    (base included), paths after it are untouched.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use rmt_core::{classify, Action, ClassificationFacts, Presence, SyncReport};
use rmt_types::RemoteSpec;
use tempfile::TempDir;

use crate::base::BaseCache;
use crate::error::{Result, SyncError};
use crate::ports::{DiffOracle, MergeOracle, MergeOutcome, RemoteExec, Transfer};
use crate::tree;

/// Options for a sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Classify and report without changing anything.
    pub dry_run: bool,
}

/// How a sync run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every path was processed.
    Success(SyncReport),
    /// A merge conflict halted the run at `path`.
    ///
    /// The local file now carries conflict markers. `report` lists what was
    /// processed up to and including the conflicted path.
    Conflict {
        /// Relative path of the conflicted file.
        path: String,
        /// What happened before the halt.
        report: SyncReport,
    },
}

impl SyncOutcome {
    /// The report, whichever way the run ended.
    pub fn report(&self) -> &SyncReport {
        match self {
            Self::Success(report) => report,
            Self::Conflict { report, .. } => report,
        }
    }

    /// Whether the run halted on a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// One classified path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Relative path below the mount root.
    pub path: String,
    /// What to do with it.
    pub action: Action,
    /// Facts the action was derived from.
    pub facts: ClassificationFacts,
}

/// Per-run scratch space, removed on drop.
struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("rmt_remote_").tempdir()?;
        Ok(Self { dir })
    }

    /// Where the remote tree is fetched to.
    fn tree(&self) -> PathBuf {
        self.dir.path().join("tree")
    }

    /// Empty file standing in for a missing common ancestor.
    fn empty_ancestor(&self) -> io::Result<PathBuf> {
        let path = self.dir.path().join("empty-base");
        File::create(&path)?;
        Ok(path)
    }

    fn merge_output(&self) -> io::Result<tempfile::TempPath> {
        Ok(tempfile::Builder::new()
            .prefix("merged-")
            .tempfile_in(self.dir.path())?
            .into_temp_path())
    }
}

/// Everything an action needs to know about the mount it runs in.
struct MountContext<'a> {
    root: &'a Path,
    remote: &'a RemoteSpec,
    base: BaseCache,
    remote_tree: PathBuf,
    scratch: &'a Scratch,
}

impl MountContext<'_> {
    fn local(&self, rel: &str) -> Result<PathBuf> {
        Ok(tree::join_rel(self.root, rel)?)
    }

    fn fetched(&self, rel: &str) -> Result<PathBuf> {
        Ok(tree::join_rel(&self.remote_tree, rel)?)
    }
}

enum Applied {
    Done,
    Conflict,
}

/// Drives sync runs through the four tool ports.
pub struct Syncer {
    transfer: Box<dyn Transfer>,
    exec: Box<dyn RemoteExec>,
    diff: Box<dyn DiffOracle>,
    merge: Box<dyn MergeOracle>,
}

impl Syncer {
    /// Create a syncer over the given ports.
    pub fn new(
        transfer: impl Transfer + 'static,
        exec: impl RemoteExec + 'static,
        diff: impl DiffOracle + 'static,
        merge: impl MergeOracle + 'static,
    ) -> Self {
        Self {
            transfer: Box::new(transfer),
            exec: Box::new(exec),
            diff: Box::new(diff),
            merge: Box::new(merge),
        }
    }

    /// Populate a new mount: create `local_root`, mirror the remote into it
    /// and capture the base cache.
    ///
    /// Returns the number of files fetched. A base cache that cannot be
    /// initialized is logged and left for the next sync, which then treats
    /// every file as never synced.
    pub async fn mount(&self, local_root: &Path, remote: &RemoteSpec) -> Result<usize> {
        fs::create_dir_all(local_root)?;
        let fetched = self.transfer.fetch_tree(remote, local_root, false).await?;
        tracing::info!(
            "Fetched {} file(s) from {} into {}",
            fetched.len(),
            remote,
            local_root.display()
        );

        if let Err(e) = BaseCache::new(local_root).initialize() {
            tracing::warn!("Could not initialize base cache: {}", e);
        }
        Ok(fetched.len())
    }

    /// One-way refresh remote → local, then re-capture the base cache.
    ///
    /// Returns the paths that were (or would be) transferred.
    pub async fn pull_only(
        &self,
        local_root: &Path,
        remote: &RemoteSpec,
        options: SyncOptions,
    ) -> Result<Vec<String>> {
        ensure_local_root(local_root)?;
        let pulled = self
            .transfer
            .fetch_tree(remote, local_root, options.dry_run)
            .await?;
        if !options.dry_run {
            BaseCache::new(local_root).initialize()?;
        }
        Ok(pulled)
    }

    /// One-way refresh local → remote, then re-capture the base cache.
    ///
    /// Returns the paths that were (or would be) transferred.
    pub async fn push_only(
        &self,
        local_root: &Path,
        remote: &RemoteSpec,
        options: SyncOptions,
    ) -> Result<Vec<String>> {
        ensure_local_root(local_root)?;
        let pushed = self
            .transfer
            .publish_tree(local_root, remote, options.dry_run)
            .await?;
        if !options.dry_run {
            BaseCache::new(local_root).initialize()?;
        }
        Ok(pushed)
    }

    /// Fetch the remote and classify every path without applying anything.
    pub async fn plan(&self, local_root: &Path, remote: &RemoteSpec) -> Result<Vec<PlannedAction>> {
        ensure_local_root(local_root)?;
        let scratch = Scratch::new()?;
        self.fetch(remote, &scratch).await?;
        self.classify_all(local_root, &scratch.tree()).await
    }

    /// Three-way sync of one mount.
    pub async fn sync(
        &self,
        local_root: &Path,
        remote: &RemoteSpec,
        options: SyncOptions,
    ) -> Result<SyncOutcome> {
        ensure_local_root(local_root)?;
        let scratch = Scratch::new()?;
        self.fetch(remote, &scratch).await?;

        let plan = self.classify_all(local_root, &scratch.tree()).await?;
        let mut report = SyncReport::new();

        if options.dry_run {
            for planned in &plan {
                report.record(&planned.path, planned.action);
            }
            tracing::info!("Dry run: {} path(s) classified", plan.len());
            return Ok(SyncOutcome::Success(report));
        }

        let ctx = MountContext {
            root: local_root,
            remote,
            base: BaseCache::new(local_root),
            remote_tree: scratch.tree(),
            scratch: &scratch,
        };

        for planned in &plan {
            match self.apply(&ctx, planned).await? {
                Applied::Done => report.record(&planned.path, planned.action),
                Applied::Conflict => {
                    tracing::warn!("Merge conflict in {}; halting", planned.path);
                    report.note(&planned.path, planned.action);
                    return Ok(SyncOutcome::Conflict {
                        path: planned.path.clone(),
                        report,
                    });
                }
            }
        }

        tracing::info!(
            "Sync of {} complete: {} pushed, {} pulled, {} merged, {} deleted",
            local_root.display(),
            report.pushed,
            report.pulled,
            report.merged,
            report.deleted
        );
        Ok(SyncOutcome::Success(report))
    }

    async fn fetch(&self, remote: &RemoteSpec, scratch: &Scratch) -> Result<()> {
        let fetched = self
            .transfer
            .fetch_tree(remote, &scratch.tree(), false)
            .await?;
        tracing::debug!("Fetched {} file(s) from {}", fetched.len(), remote);
        Ok(())
    }

    async fn classify_all(&self, local_root: &Path, remote_tree: &Path) -> Result<Vec<PlannedAction>> {
        let base = BaseCache::new(local_root);

        let mut paths = BTreeSet::new();
        paths.extend(tree::walk_files(local_root)?);
        paths.extend(tree::walk_files(remote_tree)?);
        paths.extend(base.paths()?);

        let mut plan = Vec::with_capacity(paths.len());
        for path in paths {
            let local = tree::join_rel(local_root, &path)?;
            let fetched = tree::join_rel(remote_tree, &path)?;
            let snapshot = base.path_for(&path)?;

            let presence = Presence::new(
                tree::is_file(&local),
                tree::is_file(&fetched),
                tree::is_file(&snapshot),
            );
            let local_changed = if presence.needs_local_diff() {
                Some(self.diff.compare(&snapshot, &local).await?.is_different())
            } else {
                None
            };
            let remote_changed = if presence.needs_remote_diff() {
                Some(self.diff.compare(&snapshot, &fetched).await?.is_different())
            } else {
                None
            };

            let facts = presence.with_diffs(local_changed, remote_changed);
            let action = classify(&facts);
            tracing::debug!("{}: {:?} -> {}", path, facts, action);
            plan.push(PlannedAction {
                path,
                action,
                facts,
            });
        }
        Ok(plan)
    }

    async fn apply(&self, ctx: &MountContext<'_>, planned: &PlannedAction) -> Result<Applied> {
        let rel = planned.path.as_str();
        match planned.action {
            Action::Skip => return Ok(Applied::Done),
            Action::PushNew | Action::Push => {
                let local = ctx.local(rel)?;
                self.upload(ctx, rel, &local).await?;
                ctx.base.update(rel, &local)?;
            }
            Action::PullNew | Action::Pull | Action::ConflictKeepRemote => {
                let fetched = ctx.fetched(rel)?;
                let staging = ctx.base.staging_dir();
                tree::copy_atomic(&fetched, &ctx.local(rel)?, &staging)?;
                ctx.base.update(rel, &fetched)?;
            }
            Action::DeleteRemote => {
                self.exec.remove_file(ctx.remote, rel).await?;
                ctx.base.remove(rel)?;
            }
            Action::ForgetBase => ctx.base.remove(rel)?,
            Action::Merge => return self.merge(ctx, planned).await,
        }
        tracing::info!("{} {}", planned.action, rel);
        Ok(Applied::Done)
    }

    async fn upload(&self, ctx: &MountContext<'_>, rel: &str, src: &Path) -> Result<()> {
        if let Some(parent) = tree::rel_parent(rel) {
            self.exec.create_dir_all(ctx.remote, parent).await?;
        }
        self.transfer.push_file(src, ctx.remote, rel).await?;
        Ok(())
    }

    async fn merge(&self, ctx: &MountContext<'_>, planned: &PlannedAction) -> Result<Applied> {
        let rel = planned.path.as_str();
        let local = ctx.local(rel)?;
        let fetched = ctx.fetched(rel)?;

        let ancestor = if planned.facts.has_base {
            ctx.base.path_for(rel)?
        } else {
            // Never synced: identical content only needs to be adopted.
            if !self.diff.compare(&local, &fetched).await?.is_different() {
                ctx.base.update(rel, &local)?;
                tracing::info!("{} identical on both sides; adopted as base", rel);
                return Ok(Applied::Done);
            }
            ctx.scratch.empty_ancestor()?
        };

        let output = ctx.scratch.merge_output()?;
        let outcome = self
            .merge
            .merge(&ancestor, &local, &fetched, &output)
            .await?;

        fs::set_permissions(&output, fs::metadata(&local)?.permissions())?;
        tree::copy_atomic(&output, &local, &ctx.base.staging_dir())?;

        match outcome {
            MergeOutcome::Clean => {
                self.upload(ctx, rel, &local).await?;
                ctx.base.update(rel, &local)?;
                tracing::info!("merge {}", rel);
                Ok(Applied::Done)
            }
            MergeOutcome::Conflict => Ok(Applied::Conflict),
        }
    }
}

fn ensure_local_root(local_root: &Path) -> Result<()> {
    if local_root.is_dir() {
        Ok(())
    } else {
        Err(SyncError::MissingLocalRoot(local_root.to_path_buf()))
    }
}
