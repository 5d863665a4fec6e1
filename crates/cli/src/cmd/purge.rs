//! Evict old cache entries

use super::Context;
use crate::util;
use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;

pub fn run(ctx: &Context, max_size: Option<u64>) -> Result<()> {
    let mut repo = ctx.repository()?;
    let max_bytes = max_size
        .or(repo.config().purge.max_cache_bytes)
        .context("No size limit given (use --max-size or set purge.max_cache_bytes)")?;

    let plan = repo.purge(max_bytes)?;

    if plan.evict.is_empty() {
        println!(
            "{}",
            format!("Cache already fits in {}", util::format_size(max_bytes)).dimmed()
        );
        return Ok(());
    }

    println!("{}", "Purge Complete".green().bold());
    println!(
        "Entries evicted: {}",
        plan.evict.len().to_string().yellow()
    );
    println!("Space freed:     {}", util::format_size(plan.evicted_bytes).green());
    println!("Cache size:      {}", util::format_size(plan.remaining_bytes));
    Ok(())
}
