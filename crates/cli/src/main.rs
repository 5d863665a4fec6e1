//! Stash CLI - stash command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod util;

/// Stash - content-addressed workspace sync with a local cache
#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository base directory
    #[arg(long, global = true, env = "STASH_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Root of the depot to sync from
    #[arg(long, global = true, env = "STASH_DEPOT")]
    depot: Option<PathBuf>,

    /// Log per-file detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository in the base directory
    Create {
        /// Wipe a non-empty directory that is not a repository
        #[arg(long)]
        force: bool,
    },
    /// Restore the workspace to its recorded state
    Clean {
        /// Leave files that are not part of the workspace alone
        #[arg(long)]
        keep_untracked: bool,
    },
    /// Move every workspace file into the cache
    Clear,
    /// List workspace files and cache entries
    Dump,
    /// Verify cache entries and drop damaged ones
    Repair,
    /// Revert files opened on the depot client
    Revert,
    /// Evict the oldest cache entries until the cache fits
    Purge {
        /// Cache size limit in bytes (default: purge.max_cache_bytes)
        #[arg(long)]
        max_size: Option<u64>,
    },
    /// Configure the depot client for a stream
    Setup {
        /// Stream name
        stream: String,
    },
    /// Show how many bytes each stream has that the others don't
    Stats {
        /// Streams to compare
        #[arg(required = true)]
        streams: Vec<String>,
        /// View filters (`...` wildcard, `-` prefix excludes)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Show cache and workspace totals plus local changes
    Status,
    /// Sync the workspace to a stream at a change
    Sync {
        /// Stream name
        stream: String,
        /// Change number or 'latest'
        #[arg(long, default_value = "latest")]
        change: depot::Change,
        /// View filters (`...` wildcard, `-` prefix excludes)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Write empty placeholder files instead of fetching content
        #[arg(long)]
        fake: bool,
        /// Reuse (or save) the stream snapshot in this file
        #[arg(long)]
        cache_file: Option<PathBuf>,
    },
    /// Fill the cache with the content of several streams
    Populate {
        /// Streams to populate; the workspace ends on the last one
        #[arg(required = true)]
        streams: Vec<String>,
        /// View filters (`...` wildcard, `-` prefix excludes)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Write empty placeholder files instead of fetching content
        #[arg(long)]
        fake: bool,
    },
    /// View or edit repository configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List all configuration values
    List,
    /// Get a configuration value
    Get {
        /// Dotted key, e.g. sync.batch_size_bytes
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Dotted key, e.g. sync.batch_size_bytes
        key: String,
        /// New value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = cmd::Context {
        base_dir: cli.base_dir,
        depot: cli.depot,
    };

    match cli.command {
        Commands::Create { force } => cmd::create::run(&ctx, force),
        Commands::Clean { keep_untracked } => cmd::clean::run(&ctx, keep_untracked),
        Commands::Clear => cmd::clear::run(&ctx),
        Commands::Dump => cmd::dump::run(&ctx),
        Commands::Repair => cmd::repair::run(&ctx),
        Commands::Revert => cmd::revert::run(&ctx),
        Commands::Purge { max_size } => cmd::purge::run(&ctx, max_size),
        Commands::Setup { stream } => cmd::setup::run(&ctx, &stream),
        Commands::Stats { streams, filters } => cmd::stats::run(&ctx, &streams, &filters),
        Commands::Status => cmd::status::run(&ctx),
        Commands::Sync { stream, change, filters, fake, cache_file } => {
            cmd::sync::run(&ctx, stream, change, filters, fake, cache_file)
        }
        Commands::Populate { streams, filters, fake } => {
            cmd::populate::run(&ctx, &streams, &filters, fake)
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&ctx),
            ConfigCommands::Get { key } => cmd::config::run_get(&ctx, &key),
            ConfigCommands::Set { key, value } => cmd::config::run_set(&ctx, &key, &value),
        },
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `-v`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
