//! Print every workspace file and cache entry

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;

pub fn run(ctx: &Context) -> Result<()> {
    let repo = ctx.repository()?;

    for line in repo.dump() {
        if line.ends_with(':') {
            println!("{}", line.bold());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}
