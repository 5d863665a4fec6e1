//! BLAKE3 hashing primitives for locally computed content digests
//!
//! Digests are truncated to 16 bytes so they line up with the digests
//! reported by a version-control server.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Length of a content digest in bytes
pub const DIGEST_LEN: usize = 16;

/// Files at or above this size are hashed through a memory map
pub const MMAP_THRESHOLD: u64 = 4 * 1024 * 1024;

fn truncate(hash: blake3::Hash) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hash.as_bytes()[..DIGEST_LEN]);
    out
}

/// Hash bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> [u8; DIGEST_LEN] {
    truncate(blake3::hash(data))
}

/// Hash a file using BLAKE3 (streaming for large files)
pub fn hash_file(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(truncate(hasher.finalize()))
}

/// Hash a file using memory-mapped I/O (optimized for large files > 4MB)
pub fn hash_file_mmap(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    use memmap2::Mmap;

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    // Empty files cannot be mapped on every platform
    if file.metadata()?.len() == 0 {
        return Ok(hash_bytes(&[]));
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(truncate(blake3::hash(&mmap)))
}

/// Hash a file, picking streaming or mmap based on its size
pub fn hash_file_auto(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if len >= MMAP_THRESHOLD {
        hash_file_mmap(path)
    } else {
        hash_file(path)
    }
}
