//! Verify the cache against its recorded metadata

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context) -> Result<()> {
    let mut repo = ctx.repository()?;
    let dropped = repo.repair()?;

    if dropped == 0 {
        println!("{}", "Cache is intact".dimmed());
    } else {
        println!(
            "{} Dropped {} damaged cache {}",
            "✓".green(),
            dropped.to_string().yellow(),
            if dropped == 1 { "entry" } else { "entries" }
        );
    }
    Ok(())
}
