//! Unmount a mount and (by default) delete its local copy.

use anyhow::{Context, Result};
use rmt_core::{conflict_notice, summary};
use rmt_sync::{SyncOptions, SyncOutcome};
use std::path::Path;

use super::confirm;
use crate::config::App;

/// Run the unmount command. Returns `false` if the unmount was refused or
/// cancelled.
pub async fn run(app: &App, path: &Path, keep: bool, yes: bool) -> Result<bool> {
    let record = app
        .registry
        .find(path)?
        .with_context(|| format!("{} is not a mounted path", path.display()))?;
    let local = record.local_path.clone();

    if !keep {
        println!("Doing final sync before unmount...");
        match app
            .syncer
            .sync(&local, &record.remote, SyncOptions::default())
            .await
        {
            Ok(SyncOutcome::Success(report)) => println!("{}", summary(&report)),
            Ok(SyncOutcome::Conflict { path: rel, .. }) => {
                println!();
                println!("{}", conflict_notice(&local.join(rel).display().to_string()));
                eprintln!();
                eprintln!("Cannot unmount: unresolved conflicts.");
                eprintln!("Resolve conflicts then run: rmt unmount {}", local.display());
                return Ok(false);
            }
            Err(e) => {
                eprintln!("Warning: final sync failed: {:#}", e);
                if !yes && !confirm("Continue with unmount anyway?")? {
                    println!("Unmount cancelled");
                    return Ok(false);
                }
            }
        }
    }

    app.registry.update(|table| table.remove(&local))?;
    println!("✓ Unmounted {}", local.display());

    if keep {
        println!("  Local files kept at: {}", local.display());
        println!("  Note: .rmt-base cache kept alongside local files");
    } else {
        println!("  Deleting local copy...");
        match std::fs::remove_dir_all(&local) {
            Ok(()) => println!("  ✓ Deleted {}", local.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => eprintln!("  Warning: failed to delete local files: {}", e),
        }
    }

    Ok(true)
}
