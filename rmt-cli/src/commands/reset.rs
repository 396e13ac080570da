//! Clear the mount registry.

use anyhow::Result;

use super::confirm;
use crate::config::App;

/// Run the reset command.
pub fn run(app: &App, yes: bool) -> Result<()> {
    println!(
        "This will delete the registry at: {}",
        app.registry.path().display()
    );
    println!("All mount information will be lost (local files will remain).");

    if !yes && !confirm("Continue?")? {
        println!("Reset cancelled");
        return Ok(());
    }

    if app.registry.reset()? {
        println!("✓ Registry cleared");
    } else {
        println!("Registry was already empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mount;
    use crate::commands::test_support::TestApp;

    #[tokio::test]
    async fn reset_forgets_mounts_but_keeps_files() {
        let t = TestApp::new();
        t.write_remote("a.txt", "a");
        let local = t.local("site");
        mount::run(&t.app, "host:/srv", &local).await.unwrap();

        run(&t.app, true).unwrap();
        assert!(t.app.registry.load().unwrap().is_empty());
        assert!(local.join("a.txt").exists());
    }

    #[test]
    fn reset_of_empty_registry_succeeds() {
        let t = TestApp::new();
        run(&t.app, true).unwrap();
        run(&t.app, true).unwrap();
    }
}
