//! The boundary to the version-control server

use crate::error::RemoteError;
use crate::filter::ViewFilter;
use anyhow::Result;
use stash_core::{ContentDigest, RemoteTreeSnapshot, FAKE_TYPE_SUFFIX};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// A change to sync to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Latest,
    Number(u32),
}

impl FromStr for Change {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("latest") {
            return Ok(Change::Latest);
        }
        value
            .parse::<u32>()
            .map(Change::Number)
            .map_err(|_| anyhow::anyhow!("Invalid change '{value}' (expected a number or 'latest')"))
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Latest => write!(f, "latest"),
            Change::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One file as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRecord {
    /// Slash-separated path relative to the workspace root
    pub client_path: String,
    /// Where to fetch the bytes from (path plus revision)
    pub locator: String,
    /// Missing for files deleted at the requested change
    pub digest: Option<[u8; 16]>,
    pub file_type: String,
    pub size: i64,
}

/// A request to write one revision to a local path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub locator: String,
    pub target: PathBuf,
}

/// A version-control server that can describe and deliver stream contents
///
/// Every error is fatal to the calling operation; retries are the caller's
/// concern.
pub trait RemoteSource: Send + Sync {
    /// Point the client at a stream
    fn setup(&self, stream: &str) -> Result<()>;

    /// Highest submitted change in the stream
    fn latest_change(&self, stream: &str) -> Result<u32>;

    /// Every file visible through the filter at the given change
    fn describe(&self, stream: &str, change: u32, filter: &ViewFilter) -> Result<Vec<RemoteFileRecord>>;

    /// Write the requested revisions, blocking until all are on disk
    fn fetch(&self, requests: &[FetchRequest]) -> Result<()>;

    /// Revert any files the client has open
    fn revert(&self) -> Result<()>;
}

/// Turn `Change::Latest` into a concrete change number
pub fn resolve_change(source: &dyn RemoteSource, stream: &str, change: Change) -> Result<u32> {
    match change {
        Change::Number(number) => Ok(number),
        Change::Latest => {
            let number = source.latest_change(stream)?;
            debug!(stream, change = number, "Resolved latest change");
            Ok(number)
        }
    }
}

/// Build the desired-state tree from server records
///
/// Files with no digest are deleted at this change and are left out.
/// A fake sync tags every type so its empty placeholders never mix with
/// real content in the cache.
pub fn build_snapshot(records: &[RemoteFileRecord], fake: bool) -> Result<RemoteTreeSnapshot> {
    let mut snapshot = RemoteTreeSnapshot::new();
    let mut deleted = 0usize;
    for record in records {
        let Some(digest) = record.digest else {
            deleted += 1;
            continue;
        };
        let file_type = if fake {
            format!("{}{}", record.file_type, FAKE_TYPE_SUFFIX)
        } else {
            record.file_type.clone()
        };
        snapshot.insert(
            &record.client_path,
            record.size,
            ContentDigest::new(digest, file_type),
            record.locator.clone(),
        )?;
    }
    debug!(files = records.len() - deleted, deleted, "Built remote snapshot");
    Ok(snapshot)
}

/// Query the server for a stream's contents
pub fn describe_snapshot(
    source: &dyn RemoteSource,
    stream: &str,
    change: u32,
    filter: &ViewFilter,
    fake: bool,
) -> Result<RemoteTreeSnapshot> {
    let records = source.describe(stream, change, filter)?;
    build_snapshot(&records, fake)
}

/// Split a `//stream//path#change` locator
///
/// Streams may nest (`UE5/Main`), so the stream ends at the first empty
/// segment. Neither a stream name nor a relative path can contain one.
pub fn parse_locator(locator: &str) -> Result<(&str, &str, u32), RemoteError> {
    let bad = || RemoteError::BadLocator(locator.to_owned());
    let rest = locator.strip_prefix("//").ok_or_else(bad)?;
    let (path, change) = rest.rsplit_once('#').ok_or_else(bad)?;
    let (stream, file) = path.split_once("//").ok_or_else(bad)?;
    let change = change.parse::<u32>().map_err(|_| bad())?;
    if stream.is_empty() || file.is_empty() {
        return Err(bad());
    }
    Ok((stream, file, change))
}

/// Format a locator for a file in a stream
pub fn format_locator(stream: &str, path: &str, change: u32) -> String {
    let stream = stream.trim_matches('/');
    let path = path.trim_start_matches('/');
    format!("//{stream}//{path}#{change}")
}
