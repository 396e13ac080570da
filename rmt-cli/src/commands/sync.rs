//! Sync one mount or all of them.

use anyhow::{Context, Result};
use rmt_core::{action_line, conflict_notice, summary, Action, SyncReport};
use rmt_sync::{RegistryError, SyncOptions, SyncOutcome};
use rmt_types::MountRecord;
use std::path::{Path, PathBuf};

use crate::config::App;

/// Which kind of sync to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Three-way sync against the base cache.
    Smart,
    /// Mirror remote → local only.
    PullOnly,
    /// Mirror local → remote only.
    PushOnly,
}

impl Mode {
    /// Mode selected by the `--pull` / `--push` flags.
    pub fn from_flags(pull: bool, push: bool) -> Self {
        match (pull, push) {
            (true, _) => Self::PullOnly,
            (_, true) => Self::PushOnly,
            _ => Self::Smart,
        }
    }
}

/// Run the sync command. Returns `false` if a mount failed or conflicted.
pub async fn run(app: &App, path: Option<&Path>, mode: Mode, dry_run: bool) -> Result<bool> {
    match path {
        Some(path) => sync_one(app, path, mode, dry_run).await,
        None => sync_all(app, mode, dry_run).await,
    }
}

async fn sync_one(app: &App, path: &Path, mode: Mode, dry_run: bool) -> Result<bool> {
    let record = app.registry.find(path)?.with_context(|| {
        format!(
            "{} is not a mounted path. Use 'rmt status' to see active mounts.",
            path.display()
        )
    })?;

    println!(
        "Syncing {} <-> {}...",
        record.local_path.display(),
        record.remote
    );
    println!();

    if !sync_mount(app, &record, mode, dry_run).await? {
        return Ok(false);
    }
    record_syncs(app, &[record.local_path], dry_run)?;
    println!();
    println!("✓ Sync complete");
    Ok(true)
}

async fn sync_all(app: &App, mode: Mode, dry_run: bool) -> Result<bool> {
    let table = app.registry.load()?;
    if table.is_empty() {
        println!("No active mounts");
        return Ok(true);
    }

    println!("Syncing all mounts...");
    println!();

    let mut completed = Vec::new();
    let mut failed = 0;
    for record in table.iter() {
        println!("=== {} ===", record.local_path.display());
        match sync_mount(app, record, mode, dry_run).await {
            Ok(true) => {
                completed.push(record.local_path.clone());
                println!("✓ Synced");
                println!();
            }
            Ok(false) => {
                // A conflict stops everything, but finished mounts still count.
                record_syncs(app, &completed, dry_run)?;
                return Ok(false);
            }
            Err(e) => {
                eprintln!("✗ Failed: {:#}", e);
                println!();
                failed += 1;
            }
        }
    }

    record_syncs(app, &completed, dry_run)?;
    if failed > 0 {
        eprintln!("{} of {} mount(s) failed", failed, table.len());
    }
    Ok(failed == 0)
}

/// Sync one mount and print what happened. `Ok(false)` means a conflict.
async fn sync_mount(app: &App, record: &MountRecord, mode: Mode, dry_run: bool) -> Result<bool> {
    let local = &record.local_path;
    let remote = &record.remote;
    let options = SyncOptions { dry_run };
    let failed = || format!("Sync of {} failed", local.display());

    match mode {
        Mode::PullOnly => {
            let files = app
                .syncer
                .pull_only(local, remote, options)
                .await
                .with_context(failed)?;
            print_transfers(Action::Pull, &files, dry_run);
            Ok(true)
        }
        Mode::PushOnly => {
            let files = app
                .syncer
                .push_only(local, remote, options)
                .await
                .with_context(failed)?;
            print_transfers(Action::Push, &files, dry_run);
            Ok(true)
        }
        Mode::Smart => {
            let outcome = app
                .syncer
                .sync(local, remote, options)
                .await
                .with_context(failed)?;
            for line in action_lines(outcome.report()) {
                println!("{}", line);
            }
            match outcome {
                SyncOutcome::Success(report) => {
                    if dry_run {
                        println!("Dry run: nothing was changed.");
                    }
                    println!("{}", summary(&report));
                    Ok(true)
                }
                SyncOutcome::Conflict { path, .. } => {
                    let file = local.join(&path);
                    println!();
                    println!("{}", conflict_notice(&file.display().to_string()));
                    Ok(false)
                }
            }
        }
    }
}

/// One progress line per processed path, skips included.
fn action_lines(report: &SyncReport) -> Vec<String> {
    report
        .entries
        .iter()
        .map(|entry| action_line(&entry.path, entry.action))
        .collect()
}

fn print_transfers(action: Action, files: &[String], dry_run: bool) {
    for file in files {
        println!("{}", action_line(file, action));
    }
    if dry_run {
        println!("Dry run: {} file(s) would be transferred.", files.len());
    } else {
        println!("{} file(s) transferred; base cache refreshed.", files.len());
    }
}

/// Stamp `last_sync` on completed mounts.
fn record_syncs(app: &App, completed: &[PathBuf], dry_run: bool) -> Result<()> {
    if dry_run || completed.is_empty() {
        return Ok(());
    }
    app.registry.update(|table| {
        for path in completed {
            // The mount may have been removed while the sync ran.
            if let Some(record) = table.find_mut(path) {
                record.touch_sync();
            }
        }
        Ok::<_, RegistryError>(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mount;
    use crate::commands::test_support::{write, TestApp};
    use std::fs;

    async fn mounted(t: &TestApp, name: &str) -> PathBuf {
        let local = t.local(name);
        mount::run(&t.app, "host:/srv", &local).await.unwrap();
        // Pretend the mount is old so a sync visibly moves the timestamp.
        t.app
            .registry
            .update(|table| {
                for record in table.records().to_vec() {
                    if let Some(r) = table.find_mut(&record.local_path) {
                        r.last_sync = 0;
                    }
                }
                Ok::<_, RegistryError>(())
            })
            .unwrap();
        fs::canonicalize(local).unwrap()
    }

    fn last_sync(t: &TestApp, local: &Path) -> u64 {
        t.app.registry.find(local).unwrap().unwrap().last_sync
    }

    #[test]
    fn flags_select_mode() {
        assert_eq!(Mode::from_flags(false, false), Mode::Smart);
        assert_eq!(Mode::from_flags(true, false), Mode::PullOnly);
        assert_eq!(Mode::from_flags(false, true), Mode::PushOnly);
    }

    #[tokio::test]
    async fn sync_one_pushes_and_stamps() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let local = mounted(&t, "site").await;
        write(&local, "a.txt", "edited");

        assert!(run(&t.app, Some(&local), Mode::Smart, false).await.unwrap());
        assert_eq!(
            fs::read_to_string(t.remote.root().join("a.txt")).unwrap(),
            "edited"
        );
        assert!(last_sync(&t, &local) > 0);
    }

    #[tokio::test]
    async fn action_lines_show_push_merge_then_skip() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        t.write_remote("b.txt", "one\ntwo\n");
        let local = mounted(&t, "site").await;
        let remote = t.app.registry.find(&local).unwrap().unwrap().remote;
        write(&local, "a.txt", "edited");
        write(&local, "b.txt", "ONE\ntwo\n");
        t.write_remote("b.txt", "one\nTWO\n");

        let sync = || t.app.syncer.sync(&local, &remote, SyncOptions::default());
        let first = sync().await.unwrap();
        assert_eq!(
            action_lines(first.report()),
            vec!["  push          a.txt", "  merge         b.txt"]
        );

        let second = sync().await.unwrap();
        assert_eq!(
            action_lines(second.report()),
            vec!["  skip          a.txt", "  skip          b.txt"]
        );
        assert_eq!(
            fs::read_to_string(t.remote.root().join("b.txt")).unwrap(),
            "ONE\nTWO\n"
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_stamp() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let local = mounted(&t, "site").await;
        write(&local, "a.txt", "edited");

        assert!(run(&t.app, Some(&local), Mode::Smart, true).await.unwrap());
        assert_eq!(last_sync(&t, &local), 0);
        assert_eq!(
            fs::read_to_string(t.remote.root().join("a.txt")).unwrap(),
            "a"
        );
    }

    #[tokio::test]
    async fn conflict_reports_failure() {
        let t = TestApp::new();
        t.write_remote("a.txt", "base\n");
        let local = mounted(&t, "site").await;
        write(&local, "a.txt", "ours\n");
        t.write_remote("a.txt", "theirs\n");

        assert!(!run(&t.app, Some(&local), Mode::Smart, false).await.unwrap());
        assert_eq!(last_sync(&t, &local), 0);
        assert!(fs::read_to_string(local.join("a.txt"))
            .unwrap()
            .contains("<<<<<<< ours"));
    }

    #[tokio::test]
    async fn unmounted_path_is_an_error() {
        let t = TestApp::new();
        let err = run(&t.app, Some(&t.local("nowhere")), Mode::Smart, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a mounted path"));
    }

    #[tokio::test]
    async fn sync_all_continues_past_failures() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let broken = mounted(&t, "broken").await;
        let good = mounted(&t, "good").await;
        fs::remove_dir_all(&broken).unwrap();

        assert!(!run(&t.app, None, Mode::Smart, false).await.unwrap());
        assert_eq!(last_sync(&t, &broken), 0);
        assert!(last_sync(&t, &good) > 0);
    }

    #[tokio::test]
    async fn pull_only_refreshes_every_mount() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let local = mounted(&t, "site").await;
        t.write_remote("a.txt", "newer");

        assert!(run(&t.app, None, Mode::PullOnly, false).await.unwrap());
        assert_eq!(fs::read_to_string(local.join("a.txt")).unwrap(), "newer");
        assert_eq!(
            fs::read_to_string(local.join(".rmt-base/a.txt")).unwrap(),
            "newer"
        );
    }

    #[tokio::test]
    async fn no_mounts_is_success() {
        let t = TestApp::new();
        assert!(run(&t.app, None, Mode::Smart, false).await.unwrap());
    }
}
