//! Content identity for files in the cache and workspace

use crate::codec::{put_string, Decode, DecodeError, Encode, Reader};
use crate::hash::DIGEST_LEN;
use anyhow::Result;
use bytes::{BufMut, BytesMut};

/// Suffix appended to the file type of simulated syncs so their empty
/// placeholder files never collide with real content in the cache
pub const FAKE_TYPE_SUFFIX: &str = "+fake";

/// Identifies the bytes of a file: a fixed-length digest plus a type tag
///
/// Two files with the same digest and type are assumed to be byte-identical.
/// Equality, ordering and hashing use every digest byte and the full type string.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ContentDigest {
    digest: [u8; DIGEST_LEN],
    file_type: String,
}

impl ContentDigest {
    pub fn new(digest: [u8; DIGEST_LEN], file_type: impl Into<String>) -> Self {
        Self {
            digest,
            file_type: file_type.into(),
        }
    }

    /// Parse a hex digest as reported by the server
    pub fn from_hex(hex_digest: &str, file_type: impl Into<String>) -> Result<Self> {
        let bytes = hex::decode(hex_digest)?;
        let digest: [u8; DIGEST_LEN] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "Invalid digest length: expected {} bytes, got {}",
                DIGEST_LEN,
                bytes.len()
            )
        })?;
        Ok(Self::new(digest, file_type))
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    /// Whether this identity belongs to a simulated sync
    pub fn is_fake(&self) -> bool {
        self.file_type.ends_with(FAKE_TYPE_SUFFIX)
    }

    /// Uppercase hex of the digest bytes
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.digest)
    }

    /// Seed for a cache slot id: the first eight digest bytes, big-endian
    pub fn cache_id_seed(&self) -> u64 {
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&self.digest[..8]);
        u64::from_be_bytes(seed)
    }
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentDigest({} {})", self.to_hex(), self.file_type)
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.to_hex(), self.file_type)
    }
}

impl Encode for ContentDigest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.digest);
        put_string(buf, &self.file_type);
    }
}

impl Decode for ContentDigest {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let digest = reader.read_array::<DIGEST_LEN>()?;
        let file_type = reader.read_string()?;
        Ok(Self { digest, file_type })
    }
}
