//! Create a repository

use super::Context;
use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use workspace::{Repository, RepositoryConfig};

pub fn run(ctx: &Context, force: bool) -> Result<()> {
    let base_dir = &ctx.base_dir;

    // Creating wipes the base directory, so only do it to an empty one unless told to
    if !force && base_dir.exists() {
        let occupied = std::fs::read_dir(base_dir)
            .with_context(|| format!("Failed to read {}", base_dir.display()))?
            .next()
            .is_some();
        if occupied {
            anyhow::bail!(
                "{} is not empty; pass --force to wipe it",
                base_dir.display()
            );
        }
    }

    let repo = Repository::create(base_dir, RepositoryConfig::default())?;

    println!("{} Created repository", "✓".green());
    println!("  {}: {}", "Workspace".cyan(), repo.paths().workspace_dir.display());
    println!("  {}: {}", "Cache".cyan(), repo.paths().cache_dir.display());
    Ok(())
}
