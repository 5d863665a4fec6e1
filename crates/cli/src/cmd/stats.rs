//! Compare streams by the bytes they don't share

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context, streams: &[String], filters: &[String]) -> Result<()> {
    let repo = ctx.repository()?;
    let depot = ctx.depot()?;

    let table = repo.stats(&depot, streams, filters)?;

    println!("{}", "Unique content per stream (row minus column)".bold());
    println!();
    println!("{}", table.render());
    Ok(())
}
