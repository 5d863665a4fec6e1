//! CLI command implementations

use anyhow::{Context as _, Result};
use depot::LocalDepot;
use std::path::PathBuf;
use tracing::debug;
use workspace::Repository;

pub mod clean;
pub mod clear;
pub mod config;
pub mod create;
pub mod dump;
pub mod populate;
pub mod purge;
pub mod repair;
pub mod revert;
pub mod setup;
pub mod stats;
pub mod status;
pub mod sync;

/// Global options every command receives
pub struct Context {
    pub base_dir: PathBuf,
    pub depot: Option<PathBuf>,
}

impl Context {
    /// Load the repository in the base directory
    pub fn repository(&self) -> Result<Repository> {
        if !Repository::exists(&self.base_dir) {
            anyhow::bail!(
                "Not a Stash repository: {} (run 'stash create' first)",
                self.base_dir.display()
            );
        }
        debug!(base_dir = %self.base_dir.display(), "Opening repository");
        Repository::load(&self.base_dir)
            .with_context(|| format!("Failed to load repository at {}", self.base_dir.display()))
    }

    /// Open the depot given by `--depot` or `STASH_DEPOT`
    pub fn depot(&self) -> Result<LocalDepot> {
        let root = self
            .depot
            .as_ref()
            .context("No depot given (use --depot or STASH_DEPOT)")?;
        debug!(root = %root.display(), "Opening depot");
        LocalDepot::open(root).with_context(|| format!("Failed to open depot at {}", root.display()))
    }
}
