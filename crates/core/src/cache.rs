//! Content-addressed cache of files evicted from the workspace
//!
//! Cached files live under a fixed three-level hex fan-out:
//! ```text
//! Cache/
//!   0/ .. F/
//!     0/ .. F/
//!       0/ .. F/
//!         <16 hex digit cache id>
//! ```

use crate::codec::{put_bool, Decode, DecodeError, Encode, Reader};
use crate::digest::ContentDigest;
use crate::fsutil::FileStamp;
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fan-out per directory level
const FAN_OUT: u64 = 16;

/// Location of a cached file for the given slot id
pub fn cache_path(cache_root: &Path, cache_id: u64) -> PathBuf {
    cache_root
        .join(format!("{:X}", (cache_id >> 60) & 0xF))
        .join(format!("{:X}", (cache_id >> 56) & 0xF))
        .join(format!("{:X}", (cache_id >> 52) & 0xF))
        .join(format!("{cache_id:016X}"))
}

/// Create every leaf directory of the cache (idempotent)
pub fn create_hierarchy(cache_root: &Path) -> Result<()> {
    for a in 0..FAN_OUT {
        for b in 0..FAN_OUT {
            for c in 0..FAN_OUT {
                let dir = cache_root
                    .join(format!("{a:X}"))
                    .join(format!("{b:X}"))
                    .join(format!("{c:X}"));
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
    }
    Ok(())
}

/// Metadata for one file stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub content_id: ContentDigest,
    pub cache_id: u64,
    pub length: i64,
    pub last_modified_ticks: i64,
    pub read_only: bool,
    /// Write-order stamp used for oldest-first eviction
    pub sequence_number: u32,
}

impl CacheEntry {
    pub fn path(&self, cache_root: &Path) -> PathBuf {
        cache_path(cache_root, self.cache_id)
    }

    /// Whether the physical file still matches the recorded metadata
    pub fn check_integrity(&self, cache_root: &Path) -> bool {
        match FileStamp::read(&self.path(cache_root)) {
            Ok(stamp) => {
                stamp.length == self.length
                    && stamp.last_modified_ticks == self.last_modified_ticks
                    && stamp.read_only == self.read_only
            }
            Err(_) => false,
        }
    }
}

impl Encode for CacheEntry {
    fn encode(&self, buf: &mut BytesMut) {
        self.content_id.encode(buf);
        buf.put_u64_le(self.cache_id);
        buf.put_i64_le(self.length);
        buf.put_i64_le(self.last_modified_ticks);
        put_bool(buf, self.read_only);
        buf.put_u32_le(self.sequence_number);
    }
}

impl Decode for CacheEntry {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            content_id: ContentDigest::decode(reader)?,
            cache_id: reader.read_u64()?,
            length: reader.read_i64()?,
            last_modified_ticks: reader.read_i64()?,
            read_only: reader.read_bool()?,
            sequence_number: reader.read_u32()?,
        })
    }
}

/// Authoritative index of cached content plus the set of live slot ids
#[derive(Debug, Default, Clone)]
pub struct CacheIndex {
    entries: AHashMap<ContentDigest, CacheEntry>,
    used_ids: AHashSet<u64>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted entries
    pub fn from_entries(entries: impl IntoIterator<Item = CacheEntry>) -> Result<Self> {
        let mut index = Self::new();
        for entry in entries {
            if index.used_ids.contains(&entry.cache_id) {
                anyhow::bail!("Cache id {:016X} is used twice", entry.cache_id);
            }
            if index.entries.contains_key(&entry.content_id) {
                anyhow::bail!("Content {} is cached twice", entry.content_id);
            }
            index.insert(entry);
        }
        Ok(index)
    }

    /// Pick a slot id for new content and reserve it
    ///
    /// Starts from the digest's leading bytes and probes upward until
    /// an unused id is found.
    pub fn allocate_id(&mut self, content_id: &ContentDigest) -> u64 {
        let mut id = content_id.cache_id_seed();
        while !self.used_ids.insert(id) {
            id = id.wrapping_add(1);
        }
        id
    }

    /// Add an entry whose id was allocated from this index (or loaded from disk)
    pub fn insert(&mut self, entry: CacheEntry) {
        self.used_ids.insert(entry.cache_id);
        if let Some(previous) = self.entries.insert(entry.content_id.clone(), entry) {
            debug!(content = %previous.content_id, "Replaced cache entry");
        }
    }

    /// Drop an entry and free its slot id
    pub fn remove(&mut self, content_id: &ContentDigest) -> Option<CacheEntry> {
        let entry = self.entries.remove(content_id)?;
        self.used_ids.remove(&entry.cache_id);
        Some(entry)
    }

    /// Free a reserved id that never made it into the index
    pub fn release_id(&mut self, cache_id: u64) {
        self.used_ids.remove(&cache_id);
    }

    pub fn get(&self, content_id: &ContentDigest) -> Option<&CacheEntry> {
        self.entries.get(content_id)
    }

    pub fn contains(&self, content_id: &ContentDigest) -> bool {
        self.entries.contains_key(content_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.length.max(0) as u64).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Entries ordered oldest write first
    pub fn by_sequence(&self) -> Vec<&CacheEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by_key(|e| (e.sequence_number, e.cache_id));
        entries
    }

    pub fn into_entries(self) -> impl Iterator<Item = CacheEntry> {
        self.entries.into_values()
    }

    /// Plain map view used by the planners
    pub fn entries(&self) -> &AHashMap<ContentDigest, CacheEntry> {
        &self.entries
    }
}
