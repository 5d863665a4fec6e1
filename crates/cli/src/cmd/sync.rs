//! Sync the workspace to a stream

use super::Context;
use crate::util;
use anyhow::Result;
use depot::Change;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use workspace::SyncOptions;

pub fn run(
    ctx: &Context,
    stream: String,
    change: Change,
    filters: Vec<String>,
    fake: bool,
    cache_file: Option<PathBuf>,
) -> Result<()> {
    let mut repo = ctx.repository()?;
    let depot = ctx.depot()?;

    let mut options = SyncOptions::new(stream, change);
    options.filters = filters;
    options.fake = fake;
    options.cache_file = cache_file;

    let summary = repo.sync(&depot, &options)?;

    println!(
        "{} Synced {}@{}",
        "✓".green(),
        options.stream.cyan(),
        summary.change.to_string().yellow()
    );
    println!(
        "  Removed: {} to cache, {} deleted, {} directories removed",
        summary.removed.moved_to_cache, summary.removed.deleted, summary.removed.directories_deleted
    );
    println!(
        "  Added:   {} from cache, {} copied, {} fetched ({})",
        summary.added.moved_from_cache,
        summary.added.copied,
        summary.added.synced,
        util::format_size(summary.added.synced_bytes)
    );
    if fake {
        println!("{}", "  Fetched files are empty placeholders".dimmed());
    }
    Ok(())
}
