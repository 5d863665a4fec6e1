//! Reconciliation of the workspace ledger against what is actually on disk

use crate::tree::{WorkspaceDir, WorkspaceTree};
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Sender};
use rayon::prelude::*;
use stash_core::{join_path, FileStamp};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One way the disk disagrees with the ledger
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Difference {
    /// On disk but not tracked
    Untracked(String),
    /// Tracked but gone from disk
    Missing(String),
    /// Tracked but the on-disk metadata changed
    Modified(String),
}

impl Difference {
    pub fn path(&self) -> &str {
        match self {
            Difference::Untracked(p) | Difference::Missing(p) | Difference::Modified(p) => p,
        }
    }

    pub fn marker(&self) -> char {
        match self {
            Difference::Untracked(_) => '+',
            Difference::Missing(_) => '-',
            Difference::Modified(_) => '!',
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.marker(), self.path())
    }
}

/// Result of scanning the workspace directory
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Ledger with missing and modified files dropped
    pub new_tree: WorkspaceTree,
    /// Absolute paths of files to delete
    pub files_to_delete: Vec<PathBuf>,
    /// Absolute paths of untracked directories to delete
    pub directories_to_delete: Vec<PathBuf>,
    /// Sorted by path
    pub differences: Vec<Difference>,
}

struct Scanner {
    remove_untracked: bool,
    files: Sender<PathBuf>,
    directories: Sender<PathBuf>,
    differences: Sender<Difference>,
}

impl Scanner {
    fn note(&self, difference: Difference) {
        let _ = self.differences.send(difference);
    }

    fn forget(&self, dir: WorkspaceDir, prefix: &str) {
        dir.drain_files(prefix, &mut |path, _| self.note(Difference::Missing(path)));
    }

    fn scan_dir(&self, dir: WorkspaceDir, disk: &Path, prefix: &str) -> Result<WorkspaceDir> {
        let WorkspaceDir { name, mut files, mut dirs } = dir;
        let mut kept = WorkspaceDir::new(name);
        let mut subdirs = Vec::new();

        let entries = fs::read_dir(disk).with_context(|| format!("Failed to list {}", disk.display()))?;
        for entry in entries {
            let entry = entry?;
            let Some(entry_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let path = join_path(prefix, &entry_name);
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                match dirs.remove(&entry_name) {
                    Some(tracked) => subdirs.push((tracked, entry.path(), path)),
                    None => {
                        self.note(Difference::Untracked(path));
                        if self.remove_untracked {
                            let _ = self.directories.send(entry.path());
                        }
                    }
                }
                continue;
            }

            match files.remove(&entry_name) {
                Some(tracked) => {
                    let stamp = FileStamp::from_metadata(&entry.metadata()?);
                    if tracked.matches_stamp(&stamp) {
                        kept.files.insert(entry_name, tracked);
                    } else {
                        self.note(Difference::Modified(path));
                        let _ = self.files.send(entry.path());
                    }
                }
                None => {
                    self.note(Difference::Untracked(path));
                    if self.remove_untracked {
                        let _ = self.files.send(entry.path());
                    }
                }
            }
        }

        for (file_name, _) in files {
            self.note(Difference::Missing(join_path(prefix, &file_name)));
        }
        for (dir_name, dir) in dirs {
            self.forget(dir, &join_path(prefix, &dir_name));
        }

        let scanned: Vec<WorkspaceDir> = subdirs
            .into_par_iter()
            .map(|(tracked, disk_path, path)| self.scan_dir(tracked, &disk_path, &path))
            .collect::<Result<_>>()?;
        for child in scanned {
            if !child.is_empty() {
                kept.dirs.insert(child.name.clone(), child);
            }
        }
        Ok(kept)
    }
}

/// Compare the ledger with the directory at `root`
///
/// Nothing is touched on disk; the caller applies the deletions.
pub fn scan(tree: WorkspaceTree, root: &Path, remove_untracked: bool) -> Result<ScanResult> {
    let (file_tx, file_rx) = unbounded();
    let (dir_tx, dir_rx) = unbounded();
    let (diff_tx, diff_rx) = unbounded();
    let scanner = Scanner {
        remove_untracked,
        files: file_tx,
        directories: dir_tx,
        differences: diff_tx,
    };

    let root_dir = if root.is_dir() {
        scanner.scan_dir(tree.into_root(), root, "")?
    } else {
        scanner.forget(tree.into_root(), "");
        WorkspaceDir::default()
    };
    drop(scanner);

    let mut differences: Vec<Difference> = diff_rx.try_iter().collect();
    differences.sort_by(|a, b| a.path().cmp(b.path()));

    Ok(ScanResult {
        new_tree: WorkspaceTree::from_root(root_dir),
        files_to_delete: file_rx.try_iter().collect(),
        directories_to_delete: dir_rx.try_iter().collect(),
        differences,
    })
}
