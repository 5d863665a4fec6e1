//! Workspace staging and the Stash repository
//!
//! This crate provides:
//! - The workspace tree (what is staged on disk, with recorded metadata)
//! - Removal and addition planners that diff the workspace against a stream
//! - Reconciliation of the workspace against the filesystem
//! - The `Repository` orchestrator and its configuration

pub mod add;
pub mod config;
pub mod pool;
pub mod reconcile;
pub mod remove;
pub mod repository;
pub mod stats;
pub mod tree;

// Re-exports
pub use add::{plan_addition, AdditionPlan, FileToCopy, FileToMove, FileToSync};
pub use config::RepositoryConfig;
pub use pool::FileOutcome;
pub use reconcile::{Difference, ScanResult};
pub use remove::{plan_removal, RemovalPlan, StagedFile};
pub use repository::{
    AdditionSummary, PopulateSummary, RemovalSummary, Repository, RepositoryPaths, StatusReport,
    SyncOptions, SyncSummary,
};
pub use stats::StatsTable;
pub use tree::{WorkspaceDir, WorkspaceFile, WorkspaceTree};

/// Result type for workspace operations
pub type Result<T> = anyhow::Result<T>;
