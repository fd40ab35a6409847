//! Subcommand implementations.

pub mod config;
pub mod daemon;
pub mod inspect;
pub mod sort;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use triage_core::{config as core_config, Config};
use triage_sort::Triage;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub home: PathBuf,
    /// `--config` override; `None` means `~/.triage/config.yaml`.
    pub config: Option<PathBuf>,
}

impl Globals {
    pub fn new(config: Option<PathBuf>) -> Result<Self> {
        let home = core_config::home().context("could not determine home directory")?;
        Ok(Self { home, config })
    }

    /// The config file this invocation reads and writes.
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => core_config::config_path_at(&self.home),
        }
    }

    /// Load the effective configuration. An explicit `--config` must exist.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => core_config::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => core_config::load_at(&self.home).context("failed to load config"),
        }
    }

    pub fn triage(&self) -> Result<Triage> {
        let config = self.load_config()?;
        Triage::from_config(&config, &self.home).context("invalid configuration")
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}
