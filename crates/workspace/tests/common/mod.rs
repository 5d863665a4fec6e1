//! Shared fixtures: a throwaway depot plus a repository next to it

use anyhow::Result;
use depot::{Change, LocalDepot};
use stash_core::hash::hash_bytes;
use stash_core::ContentDigest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use workspace::{Repository, RepositoryConfig, SyncOptions};

/// A depot laid out as `<root>/<stream>/<change>/...` and a repository base
pub struct Fixture {
    _temp_dir: TempDir,
    pub depot_root: PathBuf,
    pub base_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let depot_root = temp_dir.path().join("depot");
        let base_dir = temp_dir.path().join("repo");
        fs::create_dir_all(&depot_root)?;
        Ok(Self {
            _temp_dir: temp_dir,
            depot_root,
            base_dir,
        })
    }

    /// Add a file to a stream at a change
    pub fn file(&self, stream: &str, change: u32, path: &str, data: &[u8]) -> &Self {
        let target = self.change_dir(stream, change).join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, data).unwrap();
        self
    }

    /// Record a path as deleted at a change
    pub fn deleted(&self, stream: &str, change: u32, path: &str) -> &Self {
        let manifest = self.change_dir(stream, change).join(".deleted");
        let mut text = fs::read_to_string(&manifest).unwrap_or_default();
        text.push_str(path);
        text.push('\n');
        fs::write(manifest, text).unwrap();
        self
    }

    /// A change with no files at all
    pub fn empty(&self, stream: &str, change: u32) -> &Self {
        self.change_dir(stream, change);
        self
    }

    fn change_dir(&self, stream: &str, change: u32) -> PathBuf {
        let dir = self.depot_root.join(stream).join(change.to_string());
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn depot(&self) -> LocalDepot {
        LocalDepot::open(&self.depot_root).unwrap()
    }

    pub fn create(&self) -> Result<Repository> {
        Repository::create(&self.base_dir, RepositoryConfig::default())
    }

    pub fn create_with(&self, config: RepositoryConfig) -> Result<Repository> {
        Repository::create(&self.base_dir, config)
    }

    pub fn load(&self) -> Result<Repository> {
        Repository::load(&self.base_dir)
    }

    pub fn sync_dir(&self) -> PathBuf {
        self.base_dir.join("Sync")
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        fs::read(self.sync_dir().join(path)).ok()
    }
}

pub fn latest(stream: &str) -> SyncOptions {
    SyncOptions::new(stream, Change::Latest)
}

pub fn at(stream: &str, change: u32) -> SyncOptions {
    SyncOptions::new(stream, Change::Number(change))
}

pub fn text(data: &[u8]) -> ContentDigest {
    ContentDigest::new(hash_bytes(data), "text")
}

pub fn binary(data: &[u8]) -> ContentDigest {
    ContentDigest::new(hash_bytes(data), "binary")
}

/// Every regular file below `dir`, as sorted slash paths
pub fn files_on_disk(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    out.sort();
    out
}
