//! Revert open files on the depot client

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context) -> Result<()> {
    let repo = ctx.repository()?;
    let depot = ctx.depot()?;
    repo.revert(&depot)?;

    println!("{} Reverted open files", "✓".green());
    Ok(())
}
