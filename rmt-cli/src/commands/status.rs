//! Show active mounts.

use anyhow::Result;
use rmt_types::unix_now;

use crate::config::App;

/// Run the status command.
pub fn run(app: &App) -> Result<()> {
    let table = app.registry.load()?;

    if table.is_empty() {
        println!("No active mounts");
        println!();
        println!("Mount a remote directory with:");
        println!("  rmt mount user@host:/path ~/local/path");
        return Ok(());
    }

    println!("Active mounts:");
    println!();
    let now = unix_now();
    for (i, record) in table.iter().enumerate() {
        println!("  [{}] {}", i + 1, record.local_path.display());
        println!("      Remote:    {}", record.remote);
        println!(
            "      Last sync: {}",
            format_age(now.saturating_sub(record.last_sync))
        );
        println!();
    }

    println!("Commands:");
    println!("  rmt sync [path]     Sync mount (or all if no path given)");
    println!("  rmt unmount <path>  Unmount and remove from registry");
    Ok(())
}

/// Format the time since the last sync in whole hours or days.
fn format_age(seconds: u64) -> String {
    let hours = seconds / 3600;
    let days = hours / 24;
    let plural = |n: u64| if n == 1 { "" } else { "s" };

    if days > 0 {
        format!("{} day{} ago", days, plural(days))
    } else if hours > 0 {
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        "<1 hour ago".to_string()
    }
}
