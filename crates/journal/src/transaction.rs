//! Backup-file transaction protocol for the durable state file
//!
//! Before a write the live file is renamed to `<file>.transaction`. Once the
//! new file is fully written the backup is deleted. A backup found at load
//! time means the last write never completed, so it is moved back into place.

use anyhow::Result;
use stash_core::fsutil::{force_delete_file, force_move_file};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Whether the repository is consistent at the time of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// A mutation is in progress; reload must repair first
    Dirty,
    /// Cache and workspace match the recorded state
    Clean,
}

/// Path of the backup kept while a write is in flight
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".transaction");
    PathBuf::from(name)
}

/// Move the live file aside before rewriting it
///
/// A leftover backup with no live file is stale and is removed.
pub fn begin(target: &Path) -> Result<()> {
    let backup = backup_path(target);
    if target.exists() {
        force_move_file(target, &backup)?;
    } else if backup.exists() {
        force_delete_file(&backup)?;
    }
    Ok(())
}

/// Drop the backup once the new file is fully written
pub fn complete(target: &Path) -> Result<()> {
    force_delete_file(&backup_path(target))
}

/// Put the backup back if the last write never completed
///
/// Returns true if a backup was restored.
pub fn restore_backup(target: &Path) -> Result<bool> {
    let backup = backup_path(target);
    if !backup.exists() {
        return Ok(false);
    }
    warn!(file = %target.display(), "Restoring state from incomplete transaction");
    force_move_file(&backup, target)?;
    Ok(true)
}
