//! Desired-state tree as described by the remote source
//!
//! A snapshot is built fresh from a remote query or loaded from a
//! compressed snapshot file. Nodes own their children; full paths are
//! carried down each walk instead of stored as parent links.
//!
//! Snapshot file format:
//! - magic: "RTS1" (4 bytes, uncompressed)
//! - deflate stream of the root directory record, where each directory is:
//!   - file_count: u32, then per file (sorted by name):
//!     name, length: i64, digest, source_locator
//!   - dir_count: u32, then per subdirectory (sorted by name):
//!     name, <directory record>

use crate::codec::{put_string, Decode, DecodeError, Encode, Reader};
use crate::digest::ContentDigest;
use ahash::AHashMap;
use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot file signature
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"RTS1";

/// A file the remote source says should exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub length: i64,
    pub content_id: ContentDigest,
    /// Remote address plus revision needed to fetch the bytes
    pub source_locator: String,
}

/// A directory in a remote snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDir {
    pub name: String,
    pub files: AHashMap<String, RemoteFile>,
    pub dirs: AHashMap<String, RemoteDir>,
}

impl RemoteDir {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Visit every file below this directory with its slash-separated path
    pub fn walk_files<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, &'a RemoteFile)) {
        for file in self.files.values() {
            visit(join_path(prefix, &file.name), file);
        }
        for dir in self.dirs.values() {
            dir.walk_files(&join_path(prefix, &dir.name), visit);
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        let mut files: Vec<_> = self.files.values().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        buf.put_u32_le(files.len() as u32);
        for file in files {
            put_string(buf, &file.name);
            buf.put_i64_le(file.length);
            file.content_id.encode(buf);
            put_string(buf, &file.source_locator);
        }

        let mut dirs: Vec<_> = self.dirs.values().collect();
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        buf.put_u32_le(dirs.len() as u32);
        for dir in dirs {
            put_string(buf, &dir.name);
            dir.encode_body(buf);
        }
    }

    fn decode_body(name: String, reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut dir = RemoteDir::new(name);

        let file_count = reader.read_u32()?;
        for _ in 0..file_count {
            let name = reader.read_string()?;
            let length = reader.read_i64()?;
            let content_id = ContentDigest::decode(reader)?;
            let source_locator = reader.read_string()?;
            if dir.files.contains_key(&name) {
                return Err(DecodeError::Duplicate(name));
            }
            dir.files.insert(
                name.clone(),
                RemoteFile {
                    name,
                    length,
                    content_id,
                    source_locator,
                },
            );
        }

        let dir_count = reader.read_u32()?;
        for _ in 0..dir_count {
            let name = reader.read_string()?;
            if dir.dirs.contains_key(&name) {
                return Err(DecodeError::Duplicate(name));
            }
            let child = RemoteDir::decode_body(name.clone(), reader)?;
            dir.dirs.insert(name, child);
        }

        Ok(dir)
    }
}

/// Join a slash-separated relative path
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

/// The desired contents of the workspace for one stream/change/filter query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTreeSnapshot {
    root: RemoteDir,
}

impl RemoteTreeSnapshot {
    /// An empty snapshot, meaning "nothing should be staged"
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &RemoteDir {
        &self.root
    }

    /// Add a file at a slash-separated relative path, creating directories as needed
    pub fn insert(
        &mut self,
        path: &str,
        length: i64,
        content_id: ContentDigest,
        source_locator: impl Into<String>,
    ) -> Result<()> {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let name = components
            .pop()
            .with_context(|| format!("Invalid snapshot path '{path}'"))?;

        let mut dir = &mut self.root;
        for component in components {
            if dir.files.contains_key(component) {
                anyhow::bail!("'{path}' conflicts with an existing file");
            }
            dir = dir
                .dirs
                .entry(component.to_owned())
                .or_insert_with(|| RemoteDir::new(component));
        }

        if dir.files.contains_key(name) || dir.dirs.contains_key(name) {
            anyhow::bail!("Duplicate snapshot entry '{path}'");
        }
        dir.files.insert(
            name.to_owned(),
            RemoteFile {
                name: name.to_owned(),
                length,
                content_id,
                source_locator: source_locator.into(),
            },
        );
        Ok(())
    }

    /// Every file with its relative path, in no particular order
    pub fn files(&self) -> Vec<(String, &RemoteFile)> {
        let mut out = Vec::new();
        self.root.walk_files("", &mut |path, file| out.push((path, file)));
        out
    }

    pub fn file_count(&self) -> usize {
        let mut count = 0;
        self.root.walk_files("", &mut |_, _| count += 1);
        count
    }

    pub fn total_size(&self) -> u64 {
        let mut total = 0u64;
        self.root
            .walk_files("", &mut |_, file| total += file.length.max(0) as u64);
        total
    }

    /// Distinct digests in the tree with their sizes
    pub fn content_sizes(&self) -> AHashMap<ContentDigest, u64> {
        let mut sizes = AHashMap::new();
        self.root.walk_files("", &mut |_, file| {
            sizes
                .entry(file.content_id.clone())
                .or_insert(file.length.max(0) as u64);
        });
        sizes
    }

    /// Write the compressed snapshot file
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode(&mut body);

        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        writer.write_all(&SNAPSHOT_MAGIC)?;
        let mut encoder = DeflateEncoder::new(writer, Compression::default());
        encoder.write_all(&body)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        debug!(path = %path.display(), bytes = body.len(), "Saved snapshot");
        Ok(())
    }

    /// Write to a uniquely named temporary file and rename it into place
    ///
    /// If another process renames its own copy into place first, the
    /// temporary file is removed and the winner's file is kept.
    pub fn save_atomically(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .with_context(|| format!("Invalid snapshot path {}", path.display()))?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(format!(".{}", uuid::Uuid::new_v4().simple()));
        let temp_path: PathBuf = path.with_file_name(temp_name);

        self.save(&temp_path)?;
        if let Err(err) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            if !path.exists() {
                return Err(err)
                    .with_context(|| format!("Failed to move snapshot into {}", path.display()));
            }
            debug!(path = %path.display(), "Snapshot already written by another process");
        }
        Ok(())
    }

    /// Read a compressed snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut reader = Reader::new(&data);
        reader.expect_magic(SNAPSHOT_MAGIC)?;

        let mut body = Vec::new();
        DeflateDecoder::new(&data[SNAPSHOT_MAGIC.len()..])
            .read_to_end(&mut body)
            .with_context(|| format!("Failed to decompress {}", path.display()))?;

        let mut reader = Reader::new(&body);
        let snapshot = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(snapshot)
    }
}

impl Encode for RemoteTreeSnapshot {
    fn encode(&self, buf: &mut BytesMut) {
        self.root.encode_body(buf);
    }
}

impl Decode for RemoteTreeSnapshot {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            root: RemoteDir::decode_body(String::new(), reader)?,
        })
    }
}
