//! Configuration and shared command context.

use anyhow::{Context, Result};
use rmt_sync::ports::process::{Comp, Rsync, Ssh, DEFAULT_COMP};
use rmt_sync::{Registry, Syncer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// External tool locations.
    #[serde(default)]
    pub tools: ToolConfig,
}

/// `[tools]` table: binaries the sync shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// `rsync` binary.
    pub rsync: PathBuf,
    /// `ssh` binary.
    pub ssh: PathBuf,
    /// `comp` diff/merge binary.
    pub comp: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            rsync: PathBuf::from("rsync"),
            ssh: PathBuf::from("ssh"),
            comp: PathBuf::from(DEFAULT_COMP),
        }
    }
}

impl Config {
    /// Load `config.toml` from a data directory. A missing file means defaults.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Syncer backed by the configured tools.
    pub fn syncer(&self) -> Syncer {
        let comp = Comp::new(&self.tools.comp);
        Syncer::new(
            Rsync::new(&self.tools.rsync),
            Ssh::new(&self.tools.ssh),
            comp.clone(),
            comp,
        )
    }
}

/// Everything a command needs.
pub struct App {
    /// Mount registry.
    pub registry: Registry,
    /// Sync engine.
    pub syncer: Syncer,
}

impl App {
    /// Context for a data directory and its configuration.
    pub fn new(data_dir: &Path, config: &Config) -> Self {
        Self {
            registry: Registry::new(data_dir),
            syncer: config.syncer(),
        }
    }

    /// Context with an explicit syncer.
    #[cfg(test)]
    pub fn with_syncer(data_dir: &Path, syncer: Syncer) -> Self {
        Self {
            registry: Registry::new(data_dir),
            syncer,
        }
    }
}

/// Get the default data directory for rmt.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "rmt")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tools.comp, PathBuf::from("/usr/local/bin/comp"));
    }

    #[tokio::test]
    async fn partial_tools_table_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            "[tools]\ncomp = \"/opt/comp/bin/comp\"\n",
        )
        .await
        .unwrap();

        let config = Config::load(dir.path()).await.unwrap();
        assert_eq!(config.tools.comp, PathBuf::from("/opt/comp/bin/comp"));
        assert_eq!(config.tools.rsync, PathBuf::from("rsync"));
        assert_eq!(config.tools.ssh, PathBuf::from("ssh"));
    }

    #[tokio::test]
    async fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(CONFIG_FILE), "[tools\n")
            .await
            .unwrap();
        let err = Config::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn config_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("[tools]"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
