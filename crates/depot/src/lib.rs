//! Remote source integration for Stash
//!
//! This crate provides:
//! - The `RemoteSource` trait a version-control server must implement
//! - View filters narrowing a stream to the paths a workspace needs
//! - Conversion of server records into remote tree snapshots
//! - `LocalDepot`, a directory-backed source for tests and offline use

pub mod error;
pub mod filter;
pub mod local;
pub mod source;

// Re-exports
pub use error::RemoteError;
pub use filter::ViewFilter;
pub use local::LocalDepot;
pub use source::{
    build_snapshot, describe_snapshot, resolve_change, Change, FetchRequest, RemoteFileRecord,
    RemoteSource,
};
