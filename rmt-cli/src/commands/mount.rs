//! Mount a remote directory locally.

use anyhow::{Context, Result};
use rmt_sync::{resolve_local_path, RegistryError, MAX_MOUNTS};
use rmt_types::{MountRecord, RemoteSpec, ValidationError};
use std::path::Path;

use crate::config::App;

/// Run the mount command.
pub async fn run(app: &App, remote: &str, local: &Path) -> Result<()> {
    let remote = RemoteSpec::parse(remote)
        .context("Expected a remote of the form [user@]host:/path")?;
    let local = resolve_local_path(local);
    if local.exists() && !local.is_dir() {
        return Err(ValidationError::LocalPath {
            path: local.display().to_string(),
            reason: "exists and is not a directory".into(),
        }
        .into());
    }

    // Check before touching the filesystem; the update below re-checks.
    let table = app.registry.load()?;
    if table.find(&local).is_some() {
        return Err(RegistryError::AlreadyMounted(local).into());
    }
    if table.len() >= MAX_MOUNTS {
        return Err(RegistryError::Full(MAX_MOUNTS).into());
    }

    println!("Mounting {} at {}...", remote, local.display());
    println!("Initial sync (this may take a while)...");
    let fetched = app
        .syncer
        .mount(&local, &remote)
        .await
        .context("Mount failed")?;

    let local = resolve_local_path(&local);
    let record = MountRecord::new(local.clone(), remote.clone());
    app.registry.update(|table| table.add(record))?;

    println!();
    println!("✓ Mounted successfully ({} files)", fetched);
    println!("  Local:  {}", local.display());
    println!("  Remote: {}", remote);
    println!();
    println!("Sync changes with: rmt sync {}", local.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TestApp;

    #[tokio::test]
    async fn mount_fetches_and_registers() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let local = t.local("site");

        run(&t.app, "host:/srv/site", &local).await.unwrap();

        assert_eq!(std::fs::read_to_string(local.join("a.txt")).unwrap(), "a");
        assert!(local.join(".rmt-base/a.txt").exists());
        let record = t.app.registry.find(&local).unwrap().unwrap();
        assert_eq!(record.remote.to_string(), "host:/srv/site");
    }

    #[tokio::test]
    async fn mount_twice_fails() {
        let t = TestApp::new();
        let local = t.local("site");
        run(&t.app, "host:/srv/site", &local).await.unwrap();

        let err = run(&t.app, "host:/other", &local).await.unwrap_err();
        assert!(err.to_string().contains("already mounted"));
        assert_eq!(t.app.registry.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_remote_touches_nothing() {
        let t = TestApp::new();
        let local = t.local("site");

        assert!(run(&t.app, "no-colon-here", &local).await.is_err());
        assert!(!local.exists());
        assert!(t.app.registry.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_as_mount_point_is_rejected() {
        let t = TestApp::new();
        let local = t.local("plain-file");
        std::fs::write(&local, "x").unwrap();

        let err = run(&t.app, "host:/srv", &local).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));
        assert!(t.app.registry.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_is_not_registered() {
        let t = TestApp::new();
        t.remote.fail_next("host unreachable");

        assert!(run(&t.app, "host:/srv", &t.local("site")).await.is_err());
        assert!(t.app.registry.load().unwrap().is_empty());
    }
}
