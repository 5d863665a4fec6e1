//! In-memory record of what is currently staged on disk
//!
//! Directory record format (little-endian, recursive):
//! - file_count: u32, then per file (sorted by name):
//!   name, length: i64, last_modified_ticks: i64, read_only: bool, digest
//! - dir_count: u32, then per subdirectory (sorted by name):
//!   name, <directory record>

use ahash::AHashMap;
use anyhow::Result;
use bytes::{BufMut, BytesMut};
use stash_core::codec::{put_bool, put_string, Decode, DecodeError, Encode, Reader};
use stash_core::{join_path, ContentDigest, FileStamp};
use std::path::Path;

/// A staged file and the metadata it had when last written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    pub name: String,
    pub length: i64,
    pub last_modified_ticks: i64,
    pub read_only: bool,
    pub content_id: ContentDigest,
}

impl WorkspaceFile {
    /// A file whose metadata is not known until it lands on disk
    pub fn pending(name: impl Into<String>, length: i64, content_id: ContentDigest) -> Self {
        Self {
            name: name.into(),
            length,
            last_modified_ticks: 0,
            read_only: false,
            content_id,
        }
    }

    pub fn apply_stamp(&mut self, stamp: FileStamp) {
        self.length = stamp.length;
        self.last_modified_ticks = stamp.last_modified_ticks;
        self.read_only = stamp.read_only;
    }

    /// Refresh metadata from the file on disk
    pub fn update_metadata(&mut self, path: &Path) -> Result<()> {
        self.apply_stamp(FileStamp::read(path)?);
        Ok(())
    }

    /// Whether the file on disk is unchanged since it was recorded
    pub fn matches_stamp(&self, stamp: &FileStamp) -> bool {
        self.length == stamp.length
            && self.last_modified_ticks == stamp.last_modified_ticks
            && self.read_only == stamp.read_only
    }
}

/// A staged directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceDir {
    pub name: String,
    pub files: AHashMap<String, WorkspaceFile>,
    pub dirs: AHashMap<String, WorkspaceDir>,
}

impl WorkspaceDir {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Visit every file below this directory with its slash-separated path
    pub fn walk_files<'a>(&'a self, prefix: &str, visit: &mut dyn FnMut(String, &'a WorkspaceFile)) {
        for file in self.files.values() {
            visit(join_path(prefix, &file.name), file);
        }
        for dir in self.dirs.values() {
            dir.walk_files(&join_path(prefix, &dir.name), visit);
        }
    }

    /// Consume the directory, handing every file to `visit`
    pub fn drain_files(self, prefix: &str, visit: &mut dyn FnMut(String, WorkspaceFile)) {
        for (name, file) in self.files {
            visit(join_path(prefix, &name), file);
        }
        for (name, dir) in self.dirs {
            dir.drain_files(&join_path(prefix, &name), visit);
        }
    }

    /// Visit every directory below this one (not including itself)
    pub fn walk_dirs(&self, prefix: &str, visit: &mut dyn FnMut(String)) {
        for dir in self.dirs.values() {
            let path = join_path(prefix, &dir.name);
            dir.walk_dirs(&path, visit);
            visit(path);
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        let mut files: Vec<_> = self.files.values().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        buf.put_u32_le(files.len() as u32);
        for file in files {
            put_string(buf, &file.name);
            buf.put_i64_le(file.length);
            buf.put_i64_le(file.last_modified_ticks);
            put_bool(buf, file.read_only);
            file.content_id.encode(buf);
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
        let mut dir = WorkspaceDir::new(name);

        let file_count = reader.read_u32()?;
        for _ in 0..file_count {
            let file = WorkspaceFile {
                name: reader.read_string()?,
                length: reader.read_i64()?,
                last_modified_ticks: reader.read_i64()?,
                read_only: reader.read_bool()?,
                content_id: ContentDigest::decode(reader)?,
            };
            if dir.files.contains_key(&file.name) {
                return Err(DecodeError::Duplicate(file.name));
            }
            dir.files.insert(file.name.clone(), file);
        }

        let dir_count = reader.read_u32()?;
        for _ in 0..dir_count {
            let name = reader.read_string()?;
            if dir.dirs.contains_key(&name) {
                return Err(DecodeError::Duplicate(name));
            }
            let child = WorkspaceDir::decode_body(name.clone(), reader)?;
            dir.dirs.insert(name, child);
        }

        Ok(dir)
    }
}

/// The durable ledger of staged files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceTree {
    root: WorkspaceDir,
}

impl WorkspaceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: WorkspaceDir) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &WorkspaceDir {
        &self.root
    }

    pub fn into_root(self) -> WorkspaceDir {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Every staged file with its relative path, in no particular order
    pub fn files(&self) -> Vec<(String, &WorkspaceFile)> {
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

    /// First staged path for each digest
    pub fn content_index(&self) -> AHashMap<ContentDigest, String> {
        let mut index = AHashMap::new();
        self.root.walk_files("", &mut |path, file| {
            index.entry(file.content_id.clone()).or_insert(path);
        });
        index
    }

    pub fn file(&self, path: &str) -> Option<&WorkspaceFile> {
        let (dirs, name) = split_path(path)?;
        let mut dir = &self.root;
        for component in dirs {
            dir = dir.dirs.get(component)?;
        }
        dir.files.get(name)
    }

    pub fn file_mut(&mut self, path: &str) -> Option<&mut WorkspaceFile> {
        let (dirs, name) = split_path(path)?;
        let mut dir = &mut self.root;
        for component in dirs {
            dir = dir.dirs.get_mut(component)?;
        }
        dir.files.get_mut(name)
    }

    /// Record a file at a relative path, creating directories as needed
    pub fn insert_file(&mut self, path: &str, mut file: WorkspaceFile) -> Result<()> {
        let (dirs, name) =
            split_path(path).ok_or_else(|| anyhow::anyhow!("Invalid workspace path '{path}'"))?;
        let mut dir = &mut self.root;
        for component in dirs {
            dir = dir
                .dirs
                .entry(component.to_owned())
                .or_insert_with(|| WorkspaceDir::new(component));
        }
        file.name = name.to_owned();
        dir.files.insert(name.to_owned(), file);
        Ok(())
    }
}

fn split_path(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let name = components.pop()?;
    Some((components, name))
}

impl Encode for WorkspaceTree {
    fn encode(&self, buf: &mut BytesMut) {
        self.root.encode_body(buf);
    }
}

impl Decode for WorkspaceTree {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            root: WorkspaceDir::decode_body(String::new(), reader)?,
        })
    }
}
