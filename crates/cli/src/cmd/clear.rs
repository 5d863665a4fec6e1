//! Empty the workspace into the cache

use super::Context;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context) -> Result<()> {
    let mut repo = ctx.repository()?;
    repo.clear()?;

    println!("{} Workspace cleared", "✓".green());
    println!(
        "  {}: {} ({})",
        "Cache".cyan(),
        util::plural(repo.cache().len(), "file"),
        util::format_size(repo.cache().total_size())
    );
    Ok(())
}
