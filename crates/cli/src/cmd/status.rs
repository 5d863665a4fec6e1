//! Show repository totals and local changes

use super::Context;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use workspace::Difference;

pub fn run(ctx: &Context) -> Result<()> {
    let repo = ctx.repository()?;
    let report = repo.status()?;

    println!("{}", "Repository Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{}: {} ({})",
        "Cache    ".cyan(),
        util::plural(report.cache_files, "file"),
        util::format_size(report.cache_bytes)
    );
    println!(
        "{}: {} ({})",
        "Workspace".cyan(),
        util::plural(report.workspace_files, "file"),
        util::format_size(report.workspace_bytes)
    );
    if repo.requires_repair() {
        println!("{}", "Repair pending (run 'stash repair')".yellow());
    }
    println!();

    if report.differences.is_empty() {
        println!("{}", "No local changes".dimmed());
        return Ok(());
    }

    println!("{}", "Local changes:".bold());
    for difference in &report.differences {
        match difference {
            Difference::Untracked(_) => println!("  {}", difference.green()),
            Difference::Missing(_) => println!("  {}", difference.red()),
            Difference::Modified(_) => println!("  {}", difference.yellow()),
        }
    }
    Ok(())
}
