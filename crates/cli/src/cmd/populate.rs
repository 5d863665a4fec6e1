//! Fill the cache from several streams

use super::Context;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context, streams: &[String], filters: &[String], fake: bool) -> Result<()> {
    let mut repo = ctx.repository()?;
    let depot = ctx.depot()?;

    let summary = repo.populate(&depot, streams, filters, fake)?;

    println!("{} Populated {}", "✓".green(), util::plural(streams.len(), "stream"));
    println!("  Total size:       {}", util::format_size(summary.total_bytes));
    println!("  Differences:      {}", util::format_size(summary.difference_bytes));
    println!("  Entries evicted:  {}", summary.evicted_entries);
    println!(
        "  {}: {} ({})",
        "Cache".cyan(),
        util::plural(repo.cache().len(), "file"),
        util::format_size(repo.cache().total_size())
    );
    Ok(())
}
