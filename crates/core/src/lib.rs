//! Core types for the Stash workspace cache
//!
//! This crate provides:
//! - Content digests and BLAKE3 hashing helpers
//! - A little-endian binary codec for durable records
//! - Remote tree snapshots (+ compressed snapshot files)
//! - The content-addressed cache index and its on-disk layout
//! - Filesystem helpers that cope with read-only files

pub mod cache;
pub mod codec;
pub mod digest;
pub mod fsutil;
pub mod hash;
pub mod snapshot;

// Re-exports
pub use cache::{CacheEntry, CacheIndex};
pub use codec::{Decode, DecodeError, Encode, Reader};
pub use digest::{ContentDigest, FAKE_TYPE_SUFFIX};
pub use fsutil::FileStamp;
pub use snapshot::{join_path, RemoteDir, RemoteFile, RemoteTreeSnapshot};

/// Result type for core operations
pub type Result<T> = anyhow::Result<T>;
