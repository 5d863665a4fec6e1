//! Filesystem helpers that tolerate read-only files

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// The on-disk metadata used to detect external changes to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub length: i64,
    /// Nanoseconds since the Unix epoch
    pub last_modified_ticks: i64,
    pub read_only: bool,
}

impl FileStamp {
    pub fn read(path: &Path) -> Result<Self> {
        let metadata =
            fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(Self::from_metadata(&metadata))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        let last_modified_ticks = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            length: metadata.len() as i64,
            last_modified_ticks,
            read_only: metadata.permissions().readonly(),
        }
    }
}

fn clear_read_only(path: &Path) -> Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Delete a file, clearing the read-only flag if the first attempt fails
pub fn force_delete_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(_) => {
            clear_read_only(path)?;
            fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))
        }
    }
}

/// Delete a directory and everything below it
pub fn force_delete_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        let _ = clear_read_only(entry.path());
    }
    fs::remove_dir_all(path).with_context(|| format!("Failed to delete {}", path.display()))
}

/// Move a file, creating the destination's parent directory
pub fn force_move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if to.exists() {
        force_delete_file(to)?;
    }
    fs::rename(from, to)
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))
}

/// Copy a file, creating the destination's parent directory
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.exists() {
        force_delete_file(to)?;
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Remove every entry inside a directory, keeping the directory itself
pub fn delete_directory_contents(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            force_delete_directory(&path)?;
        } else {
            force_delete_file(&path)?;
        }
    }
    Ok(())
}

/// Atomic write helper
///
/// Writes data to a temporary file next to the target, fsyncs it, then
/// renames it over the target.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .with_context(|| format!("Invalid target {}", target.display()))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let temp_path = target.with_file_name(temp_name);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, target)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result.with_context(|| format!("Failed to write {}", target.display()))
}
