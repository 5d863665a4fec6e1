//! A remote source backed by plain directories
//!
//! Layout:
//! ```text
//! <root>/
//!   <stream>/
//!     <change number>/     full tree of the stream at that change
//!       .deleted           optional: paths deleted at this change, one per line
//!       ...files...
//! ```
//! Asking for change N reads the highest change directory at or below N.

use crate::error::RemoteError;
use crate::filter::ViewFilter;
use crate::source::{format_locator, parse_locator, FetchRequest, RemoteFileRecord, RemoteSource};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use stash_core::hash::hash_file_auto;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the per-change deletion manifest
pub const DELETED_MANIFEST: &str = ".deleted";

/// Bytes inspected when deciding whether a file is text
const SNIFF_LEN: usize = 8000;

/// Directory-backed depot
pub struct LocalDepot {
    root: PathBuf,
    current_stream: Mutex<Option<String>>,
}

impl LocalDepot {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Depot root {} does not exist", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
            current_stream: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stream chosen by the last `setup`
    pub fn current_stream(&self) -> Option<String> {
        self.current_stream.lock().clone()
    }

    fn stream_dir(&self, stream: &str) -> Result<PathBuf, RemoteError> {
        let dir = self.root.join(stream.trim_start_matches('/'));
        if stream.is_empty() || !dir.is_dir() {
            return Err(RemoteError::UnknownStream(stream.to_owned()));
        }
        Ok(dir)
    }

    /// Change directories of a stream, ascending
    fn changes(&self, stream: &str) -> Result<Vec<u32>> {
        let dir = self.stream_dir(stream)?;
        let mut changes: Vec<u32> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .collect();
        changes.sort_unstable();
        Ok(changes)
    }

    /// The change directory that serves a request for `change`
    fn effective_change(&self, stream: &str, change: u32) -> Result<u32> {
        self.changes(stream)?
            .into_iter()
            .rev()
            .find(|c| *c <= change)
            .ok_or_else(|| {
                RemoteError::UnknownChange {
                    stream: stream.to_owned(),
                    change,
                }
                .into()
            })
    }

    fn read_deleted(change_dir: &Path) -> Result<Vec<String>> {
        let manifest = change_dir.join(DELETED_MANIFEST);
        if !manifest.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        Ok(text
            .lines()
            .map(|line| line.trim().trim_start_matches('/'))
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

fn sniff_file_type(path: &Path) -> Result<&'static str> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(if head.contains(&0) { "binary" } else { "text" })
}

fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl RemoteSource for LocalDepot {
    fn setup(&self, stream: &str) -> Result<()> {
        self.stream_dir(stream)?;
        *self.current_stream.lock() = Some(stream.to_owned());
        info!(stream, "Client set up");
        Ok(())
    }

    fn latest_change(&self, stream: &str) -> Result<u32> {
        self.changes(stream)?
            .last()
            .copied()
            .ok_or_else(|| {
                RemoteError::UnknownChange {
                    stream: stream.to_owned(),
                    change: 0,
                }
                .into()
            })
    }

    fn describe(&self, stream: &str, change: u32, filter: &ViewFilter) -> Result<Vec<RemoteFileRecord>> {
        let effective = self.effective_change(stream, change)?;
        let change_dir = self.stream_dir(stream)?.join(effective.to_string());

        let paths: Vec<(String, PathBuf)> = WalkDir::new(&change_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = relative_slash_path(&change_dir, entry.path())?;
                (relative != DELETED_MANIFEST && filter.includes(&relative))
                    .then(|| (relative, entry.into_path()))
            })
            .collect();

        let mut records: Vec<RemoteFileRecord> = paths
            .par_iter()
            .map(|(relative, path)| -> Result<RemoteFileRecord> {
                let size = std::fs::metadata(path)?.len() as i64;
                Ok(RemoteFileRecord {
                    client_path: relative.clone(),
                    locator: format_locator(stream, relative, effective),
                    digest: Some(hash_file_auto(path)?),
                    file_type: sniff_file_type(path)?.to_owned(),
                    size,
                })
            })
            .collect::<Result<_>>()?;

        for deleted in Self::read_deleted(&change_dir)? {
            if filter.includes(&deleted) {
                records.push(RemoteFileRecord {
                    locator: format_locator(stream, &deleted, effective),
                    client_path: deleted,
                    digest: None,
                    file_type: "text".to_owned(),
                    size: 0,
                });
            }
        }

        debug!(stream, change, effective, files = records.len(), "Described stream");
        Ok(records)
    }

    fn fetch(&self, requests: &[FetchRequest]) -> Result<()> {
        requests.par_iter().try_for_each(|request| -> Result<()> {
            let (stream, path, change) = parse_locator(&request.locator)?;
            let source = self.stream_dir(stream)?.join(change.to_string()).join(path);
            let copy = || -> std::io::Result<()> {
                if let Some(parent) = request.target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &request.target)?;
                Ok(())
            };
            copy().map_err(|source| RemoteError::FetchFailed {
                locator: request.locator.clone(),
                target: request.target.clone(),
                source,
            })?;
            Ok(())
        })
    }

    fn revert(&self) -> Result<()> {
        debug!("No open files to revert");
        Ok(())
    }
}
