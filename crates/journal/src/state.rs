//! Durable repository state record
//!
//! Format (little-endian):
//! - revision: i32
//! - requires_repair: bool
//! - reserved: string (always empty)
//! - next_sequence_number: u32
//! - cache_entry_count: u32, then each cache entry
//! - workspace tree record

use crate::transaction::{self, TransactionState};
use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use stash_core::codec::{put_bool, put_string, Decode, DecodeError, Encode, Reader};
use stash_core::CacheEntry;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Current format revision of the state file
pub const CURRENT_REVISION: i32 = 1;

/// Failures that make a repository unusable until it is recreated
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no repository at {0} (signature missing or mismatched)")]
    BadSignature(PathBuf),

    #[error("unsupported data format (revision {found}, expected {expected})")]
    UnsupportedRevision { found: i32, expected: i32 },

    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

/// Everything persisted about a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableState<W> {
    pub requires_repair: bool,
    pub next_sequence_number: u32,
    pub cache_entries: Vec<CacheEntry>,
    pub workspace: W,
}

impl<W: Encode> DurableState<W> {
    /// Encode the record; a dirty save always persists the repair flag
    pub fn encode_record(&self, state: TransactionState) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32_le(CURRENT_REVISION);
        put_bool(
            &mut buf,
            self.requires_repair || state != TransactionState::Clean,
        );
        put_string(&mut buf, "");
        buf.put_u32_le(self.next_sequence_number);

        buf.put_u32_le(self.cache_entries.len() as u32);
        for entry in &self.cache_entries {
            entry.encode(&mut buf);
        }

        self.workspace.encode(&mut buf);
        buf
    }
}

impl<W: Decode> DurableState<W> {
    pub fn decode_record(data: &[u8]) -> Result<Self, DecodeOrRevision> {
        let mut reader = Reader::new(data);
        let revision = reader.read_i32()?;
        if revision != CURRENT_REVISION {
            return Err(DecodeOrRevision::Revision(revision));
        }

        let requires_repair = reader.read_bool()?;
        let _reserved = reader.read_string()?;
        let next_sequence_number = reader.read_u32()?;

        let count = reader.read_u32()?;
        let mut cache_entries = Vec::with_capacity(count.min(1 << 20) as usize);
        for _ in 0..count {
            cache_entries.push(CacheEntry::decode(&mut reader)?);
        }

        let workspace = W::decode(&mut reader)?;
        reader.finish()?;

        Ok(Self {
            requires_repair,
            next_sequence_number,
            cache_entries,
            workspace,
        })
    }
}

/// Decode failure or a revision mismatch
#[derive(Debug)]
pub enum DecodeOrRevision {
    Decode(DecodeError),
    Revision(i32),
}

impl From<DecodeError> for DecodeOrRevision {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

/// Write the state file inside a backup transaction
pub fn save<W: Encode>(path: &Path, state: &DurableState<W>, mode: TransactionState) -> Result<()> {
    let record = state.encode_record(mode);

    transaction::begin(path)?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&record)?;
    file.sync_all()?;
    drop(file);
    transaction::complete(path)?;

    debug!(
        path = %path.display(),
        bytes = record.len(),
        state = ?mode,
        entries = state.cache_entries.len(),
        "Saved repository state"
    );
    Ok(())
}

/// Read the state file, restoring an interrupted transaction first
pub fn load<W: Decode>(path: &Path) -> Result<DurableState<W>> {
    transaction::restore_backup(path)?;
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    match DurableState::decode_record(&data) {
        Ok(state) => Ok(state),
        Err(DecodeOrRevision::Revision(found)) => Err(StateError::UnsupportedRevision {
            found,
            expected: CURRENT_REVISION,
        }
        .into()),
        Err(DecodeOrRevision::Decode(source)) => Err(StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}
