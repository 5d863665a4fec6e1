//! Restore the workspace to its recorded state

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context, keep_untracked: bool) -> Result<()> {
    let mut repo = ctx.repository()?;
    let remove_untracked = !keep_untracked && repo.config().clean.remove_untracked;

    repo.clean(remove_untracked)?;

    println!("{} Workspace is clean", "✓".green());
    Ok(())
}
