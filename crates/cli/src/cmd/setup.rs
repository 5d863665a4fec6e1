//! Point the depot client at a stream

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context, stream: &str) -> Result<()> {
    let repo = ctx.repository()?;
    let depot = ctx.depot()?;
    repo.setup(&depot, stream)?;

    println!("{} Client set up for {}", "✓".green(), stream.cyan());
    Ok(())
}
