//! Repository signature file
//!
//! A repository exists at a path only if its signature file holds the
//! expected value. Bumping the low bits invalidates every older repository.

use crate::state::StateError;
use anyhow::Result;
use stash_core::fsutil::atomic_write;
use std::path::Path;

/// `('W' << 24) | ('T' << 16) | version`
pub const SIGNATURE: i32 = ((b'W' as i32) << 24) | ((b'T' as i32) << 16) | 1;

/// Write the signature; done last when creating a repository
pub fn write(path: &Path) -> Result<()> {
    atomic_write(path, &SIGNATURE.to_le_bytes())
}

/// Whether a valid signature exists at the path
pub fn matches(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(data) => data == SIGNATURE.to_le_bytes(),
        Err(_) => false,
    }
}

/// Fail with [`StateError::BadSignature`] unless the signature matches
pub fn verify(path: &Path) -> Result<()> {
    if !matches(path) {
        return Err(StateError::BadSignature(path.to_path_buf()).into());
    }
    Ok(())
}
