//! Configuration management command
//!
//! Views and edits `<base>/config.toml` without loading the repository state.

use super::Context;
use anyhow::Result;
use owo_colors::OwoColorize;
use workspace::{Repository, RepositoryConfig, RepositoryPaths};

fn config_path(ctx: &Context) -> Result<std::path::PathBuf> {
    if !Repository::exists(&ctx.base_dir) {
        anyhow::bail!("Not a Stash repository: {}", ctx.base_dir.display());
    }
    Ok(RepositoryPaths::new(&ctx.base_dir).config_file)
}

/// List all configuration values
pub fn run_list(ctx: &Context) -> Result<()> {
    let path = config_path(ctx)?;
    let config = RepositoryConfig::load(&path)?;

    println!("{}", "Repository Configuration".bold());
    println!("{}: {}", "Location".dimmed(), path.display().dimmed());

    let mut section = "";
    for key in RepositoryConfig::KEYS {
        let (prefix, name) = key.split_once('.').unwrap_or(("", key));
        if prefix != section {
            section = prefix;
            println!("\n{}", format!("[{section}]").yellow());
        }
        println!("  {} = {}", name.cyan(), config.get(key)?);
    }
    Ok(())
}

/// Get a single configuration value
pub fn run_get(ctx: &Context, key: &str) -> Result<()> {
    let config = RepositoryConfig::load(&config_path(ctx)?)?;
    println!("{}", config.get(key)?);
    Ok(())
}

/// Set a configuration value
pub fn run_set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let path = config_path(ctx)?;
    let mut config = RepositoryConfig::load(&path)?;
    config.set(key, value)?;
    config.save(&path)?;

    println!("{} Set {} = {}", "✓".green(), key.cyan(), config.get(key)?);
    Ok(())
}
