//! Per-repository configuration (`<base>/config.toml`)
//!
//! Every field has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stash_core::fsutil::atomic_write;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.toml";

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bytes requested from the server per fetch batch
    pub batch_size_bytes: u64,
    /// Worker threads for file operations (0 = one per core)
    pub threads: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size_bytes: 256 * MIB,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Delete files and directories the workspace doesn't track
    pub remove_untracked: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { remove_untracked: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Cache budget used when `purge` is run without an explicit size
    pub max_cache_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub sync: SyncConfig,
    pub clean: CleanConfig,
    pub purge: PurgeConfig,
}

impl RepositoryConfig {
    /// Read the config file, falling back to defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        atomic_write(path, text.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size_bytes == 0 {
            anyhow::bail!("sync.batch_size_bytes must be greater than 0");
        }
        if self.sync.threads > 1024 {
            anyhow::bail!("sync.threads must be between 0 and 1024, got {}", self.sync.threads);
        }
        Ok(())
    }

    /// Value of a dotted key, as shown by `config get`
    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            "sync.batch_size_bytes" => self.sync.batch_size_bytes.to_string(),
            "sync.threads" => self.sync.threads.to_string(),
            "clean.remove_untracked" => self.clean.remove_untracked.to_string(),
            "purge.max_cache_bytes" => self
                .purge
                .max_cache_bytes
                .map_or_else(|| "none".to_owned(), |v| v.to_string()),
            _ => anyhow::bail!("Unknown config key: {key}"),
        })
    }

    /// Set a dotted key from its string form and validate the result
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "sync.batch_size_bytes" => {
                self.sync.batch_size_bytes = value
                    .parse()
                    .context("Invalid value: must be a positive integer")?;
            }
            "sync.threads" => {
                self.sync.threads = value
                    .parse()
                    .context("Invalid value: must be a non-negative integer")?;
            }
            "clean.remove_untracked" => {
                self.clean.remove_untracked = value
                    .parse()
                    .context("Invalid value: must be 'true' or 'false'")?;
            }
            "purge.max_cache_bytes" => {
                self.purge.max_cache_bytes = if value == "none" {
                    None
                } else {
                    Some(value.parse().context("Invalid value: must be a byte count or 'none'")?)
                };
            }
            _ => anyhow::bail!("Unknown config key: {key}"),
        }
        self.validate()
    }

    pub const KEYS: [&'static str; 4] = [
        "sync.batch_size_bytes",
        "sync.threads",
        "clean.remove_untracked",
        "purge.max_cache_bytes",
    ];
}
