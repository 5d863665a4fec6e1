//! Durable state management for a Stash repository
//!
//! This crate provides:
//! - The repository state record (cache index + workspace tree)
//! - Crash-safe backup-file transactions around every save
//! - The repository signature file
//! - Retention policy for cache purges

pub mod retention;
pub mod signature;
pub mod state;
pub mod transaction;

// Re-exports
pub use retention::{PurgePlan, RetentionPolicy};
pub use state::{DurableState, StateError, CURRENT_REVISION};
pub use transaction::TransactionState;

/// Result type for journal operations
pub type Result<T> = anyhow::Result<T>;
