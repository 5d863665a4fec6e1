//! Addition planning: how each missing file gets into the workspace
//!
//! Runs after removal, so every staged file that survives already matches
//! the target by name. Directories the target doesn't mention are left
//! alone. For a file the workspace lacks, the cheapest source wins:
//!
//! 1. the cache, moved in (only once per digest)
//! 2. another path already holding the same digest, copied
//! 3. the server, once per digest
//!
//! Copies from a file that is itself being moved in are ordered after the
//! moves by the caller. Duplicates of a synced file are copied from it once
//! the sync has finished.

use crate::tree::{WorkspaceDir, WorkspaceFile, WorkspaceTree};
use ahash::AHashMap;
use crossbeam_channel::{unbounded, Sender};
use dashmap::DashMap;
use rayon::prelude::*;
use stash_core::{join_path, CacheEntry, ContentDigest, RemoteDir, RemoteTreeSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToMove {
    /// Destination relative to the workspace root
    pub path: String,
    /// Where to fetch the file from if the move fails
    pub locator: String,
    pub cache_entry: CacheEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToCopy {
    pub source: String,
    pub target: String,
    pub locator: String,
    pub content_id: ContentDigest,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToSync {
    pub path: String,
    pub locator: String,
    pub content_id: ContentDigest,
    pub length: i64,
}

/// Output of addition planning
#[derive(Debug, Default)]
pub struct AdditionPlan {
    pub new_tree: WorkspaceTree,
    pub files_to_move: Vec<FileToMove>,
    pub files_to_copy: Vec<FileToCopy>,
    pub files_to_sync: Vec<FileToSync>,
    /// Copies whose source is one of `files_to_sync`
    pub files_to_duplicate: Vec<FileToCopy>,
}

impl AdditionPlan {
    pub fn is_empty(&self) -> bool {
        self.files_to_move.is_empty()
            && self.files_to_copy.is_empty()
            && self.files_to_sync.is_empty()
            && self.files_to_duplicate.is_empty()
    }

    /// Bytes that will come from the server
    pub fn sync_bytes(&self) -> u64 {
        self.files_to_sync.iter().map(|f| f.length.max(0) as u64).sum()
    }
}

struct Planner<'a> {
    cache: &'a AHashMap<ContentDigest, CacheEntry>,
    resident: AHashMap<ContentDigest, String>,
    claimed: DashMap<ContentDigest, String>,
    fetching: DashMap<ContentDigest, String>,
    moves: Sender<FileToMove>,
    copies: Sender<FileToCopy>,
    syncs: Sender<FileToSync>,
    duplicates: Sender<FileToCopy>,
}

impl Planner<'_> {
    /// Decide where one missing file comes from; returns its new record
    fn place(&self, path: String, wanted: &stash_core::RemoteFile) -> WorkspaceFile {
        let content_id = &wanted.content_id;

        if let Some(entry) = self.cache.get(content_id) {
            match self.claimed.entry(content_id.clone()) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(path.clone());
                    let file = WorkspaceFile {
                        name: wanted.name.clone(),
                        length: entry.length,
                        last_modified_ticks: entry.last_modified_ticks,
                        read_only: entry.read_only,
                        content_id: content_id.clone(),
                    };
                    let _ = self.moves.send(FileToMove {
                        path,
                        locator: wanted.source_locator.clone(),
                        cache_entry: entry.clone(),
                    });
                    return file;
                }
                dashmap::mapref::entry::Entry::Occupied(claimer) => {
                    let _ = self.copies.send(FileToCopy {
                        source: claimer.get().clone(),
                        target: path,
                        locator: wanted.source_locator.clone(),
                        content_id: content_id.clone(),
                        length: wanted.length,
                    });
                    return WorkspaceFile::pending(wanted.name.clone(), wanted.length, content_id.clone());
                }
            }
        }

        if let Some(source) = self.resident.get(content_id) {
            let _ = self.copies.send(FileToCopy {
                source: source.clone(),
                target: path,
                locator: wanted.source_locator.clone(),
                content_id: content_id.clone(),
                length: wanted.length,
            });
        } else {
            match self.fetching.entry(content_id.clone()) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(path.clone());
                    let _ = self.syncs.send(FileToSync {
                        path,
                        locator: wanted.source_locator.clone(),
                        content_id: content_id.clone(),
                        length: wanted.length,
                    });
                }
                dashmap::mapref::entry::Entry::Occupied(fetcher) => {
                    let _ = self.duplicates.send(FileToCopy {
                        source: fetcher.get().clone(),
                        target: path,
                        locator: wanted.source_locator.clone(),
                        content_id: content_id.clone(),
                        length: wanted.length,
                    });
                }
            }
        }
        WorkspaceFile::pending(wanted.name.clone(), wanted.length, content_id.clone())
    }

    fn merge(&self, dir: WorkspaceDir, target: &RemoteDir, path: &str) -> WorkspaceDir {
        let WorkspaceDir { name, mut files, mut dirs } = dir;

        for (file_name, wanted) in &target.files {
            if !files.contains_key(file_name) {
                let file = self.place(join_path(path, file_name), wanted);
                files.insert(file_name.clone(), file);
            }
        }

        let mut work: Vec<(WorkspaceDir, &RemoteDir)> = Vec::with_capacity(target.dirs.len());
        for (dir_name, target_child) in &target.dirs {
            let child = dirs
                .remove(dir_name)
                .unwrap_or_else(|| WorkspaceDir::new(dir_name.clone()));
            work.push((child, target_child));
        }

        let merged: Vec<WorkspaceDir> = work
            .into_par_iter()
            .map(|(child, target_child)| {
                let child_path = join_path(path, &child.name);
                self.merge(child, target_child, &child_path)
            })
            .collect();
        for child in merged {
            dirs.insert(child.name.clone(), child);
        }

        WorkspaceDir { name, files, dirs }
    }
}

/// Plan how to bring every file of `target` into `current`
pub fn plan_addition(
    current: WorkspaceTree,
    target: &RemoteTreeSnapshot,
    cache: &AHashMap<ContentDigest, CacheEntry>,
) -> AdditionPlan {
    let (move_tx, move_rx) = unbounded();
    let (copy_tx, copy_rx) = unbounded();
    let (sync_tx, sync_rx) = unbounded();
    let (duplicate_tx, duplicate_rx) = unbounded();
    let planner = Planner {
        cache,
        resident: current.content_index(),
        claimed: DashMap::new(),
        fetching: DashMap::new(),
        moves: move_tx,
        copies: copy_tx,
        syncs: sync_tx,
        duplicates: duplicate_tx,
    };

    let root = planner.merge(current.into_root(), target.root(), "");
    drop(planner);

    let mut files_to_sync: Vec<FileToSync> = sync_rx.try_iter().collect();
    files_to_sync.sort_by(|a, b| a.path.cmp(&b.path));

    AdditionPlan {
        new_tree: WorkspaceTree::from_root(root),
        files_to_move: move_rx.try_iter().collect(),
        files_to_copy: copy_rx.try_iter().collect(),
        files_to_sync,
        files_to_duplicate: duplicate_rx.try_iter().collect(),
    }
}
