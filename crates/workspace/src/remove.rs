//! Removal planning: which staged files must leave the workspace
//!
//! The current tree is merged against the target snapshot. Files whose
//! name and digest both match stay in place. Every other file leaves: the
//! first file seen for an uncached digest moves into the cache, all others
//! are deleted. Directories missing from the target are deleted wholesale.
//!
//! Subdirectories are planned in parallel on the current rayon pool. The
//! call returns only after the whole walk has finished.

use crate::tree::{WorkspaceDir, WorkspaceFile, WorkspaceTree};
use ahash::AHashMap;
use crossbeam_channel::{unbounded, Sender};
use dashmap::DashMap;
use rayon::prelude::*;
use stash_core::{join_path, CacheEntry, ContentDigest, RemoteDir, RemoteTreeSnapshot};
use std::collections::BTreeMap;

/// A staged file together with its relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: String,
    pub file: WorkspaceFile,
}

/// Output of removal planning
#[derive(Debug, Default)]
pub struct RemovalPlan {
    /// The workspace as it will look once the plan is applied
    pub new_tree: WorkspaceTree,
    /// One staged file per uncached digest, to be moved into the cache
    pub files_to_move: AHashMap<ContentDigest, StagedFile>,
    pub files_to_delete: Vec<StagedFile>,
    /// Relative directory paths, deepest (longest) first
    pub directories_to_delete: Vec<String>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.files_to_move.is_empty()
            && self.files_to_delete.is_empty()
            && self.directories_to_delete.is_empty()
    }
}

struct Planner<'a> {
    cache: &'a AHashMap<ContentDigest, CacheEntry>,
    movers: DashMap<ContentDigest, StagedFile>,
    deletes: Sender<StagedFile>,
    directories: Sender<String>,
}

impl Planner<'_> {
    fn evict(&self, path: String, file: WorkspaceFile) {
        let staged = StagedFile { path, file };
        if self.cache.contains_key(&staged.file.content_id) {
            let _ = self.deletes.send(staged);
            return;
        }
        match self.movers.entry(staged.file.content_id.clone()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(staged);
            }
            dashmap::mapref::entry::Entry::Occupied(_) => {
                let _ = self.deletes.send(staged);
            }
        }
    }

    fn evict_dir(&self, dir: WorkspaceDir, path: String) {
        let WorkspaceDir { files, dirs, .. } = dir;
        for (name, file) in files {
            self.evict(join_path(&path, &name), file);
        }
        dirs.into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .for_each(|(name, child)| self.evict_dir(child, join_path(&path, &name)));
        let _ = self.directories.send(path);
    }

    fn merge(&self, dir: WorkspaceDir, target: &RemoteDir, path: &str) -> WorkspaceDir {
        let WorkspaceDir { name, files, dirs } = dir;
        let mut new_dir = WorkspaceDir::new(name);

        for (name, file) in files {
            let keep = target
                .files
                .get(&name)
                .is_some_and(|wanted| wanted.content_id == file.content_id);
            if keep {
                new_dir.files.insert(name, file);
            } else {
                self.evict(join_path(path, &name), file);
            }
        }

        let merged: Vec<WorkspaceDir> = dirs
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .filter_map(|(name, child)| {
                let child_path = join_path(path, &name);
                match target.dirs.get(&name) {
                    Some(target_child) => Some(self.merge(child, target_child, &child_path)),
                    None => {
                        self.evict_dir(child, child_path);
                        None
                    }
                }
            })
            .collect();
        for child in merged {
            new_dir.dirs.insert(child.name.clone(), child);
        }
        new_dir
    }
}

/// Directories grouped by depth, deepest level first
///
/// No directory shares a level with one of its ancestors, so each level
/// can be removed in parallel once the level before it is gone.
pub fn directory_levels(directories: &[String]) -> Vec<Vec<&str>> {
    let mut levels: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for dir in directories {
        levels.entry(dir.matches('/').count()).or_default().push(dir);
    }
    levels.into_values().rev().collect()
}

/// Plan how to turn `current` into the subset of itself that `target` keeps
///
/// An empty target evicts everything.
pub fn plan_removal(
    current: WorkspaceTree,
    target: &RemoteTreeSnapshot,
    cache: &AHashMap<ContentDigest, CacheEntry>,
) -> RemovalPlan {
    let (delete_tx, delete_rx) = unbounded();
    let (dir_tx, dir_rx) = unbounded();
    let planner = Planner {
        cache,
        movers: DashMap::new(),
        deletes: delete_tx,
        directories: dir_tx,
    };

    let root = planner.merge(current.into_root(), target.root(), "");

    let Planner { movers, .. } = planner;
    let files_to_delete: Vec<StagedFile> = delete_rx.try_iter().collect();
    let mut directories_to_delete: Vec<String> = dir_rx.try_iter().collect();
    directories_to_delete.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    RemovalPlan {
        new_tree: WorkspaceTree::from_root(root),
        files_to_move: movers.into_iter().collect(),
        files_to_delete,
        directories_to_delete,
    }
}
