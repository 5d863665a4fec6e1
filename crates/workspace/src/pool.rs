//! Bulk file operations on a shared worker pool
//!
//! A failed item never aborts its batch. Each item reports a
//! [`FileOutcome`] and the caller decides what a failure means.

use anyhow::Result;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Done,
    Failed(String),
}

impl FileOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, FileOutcome::Done)
    }
}

impl From<Result<()>> for FileOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => FileOutcome::Done,
            Err(err) => FileOutcome::Failed(format!("{err:#}")),
        }
    }
}

/// Build the pool used for every parallel phase (`threads == 0` means one
/// thread per core)
pub fn build_pool(threads: usize) -> Result<ThreadPool> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("stash-worker-{idx}"))
        .build()?;
    Ok(pool)
}

/// Run `op` over every item in parallel, returning outcomes in input order
pub fn run_all<T, F>(pool: &ThreadPool, items: &[T], op: F) -> Vec<FileOutcome>
where
    T: Sync,
    F: Fn(&T) -> Result<()> + Sync,
{
    pool.install(|| items.par_iter().map(|item| FileOutcome::from(op(item))).collect())
}

/// Pair items with their failures, logging each one
pub fn failures<'a, T>(
    items: &'a [T],
    outcomes: &'a [FileOutcome],
    describe: impl Fn(&T) -> String,
) -> Vec<(&'a T, &'a str)> {
    items
        .iter()
        .zip(outcomes)
        .filter_map(|(item, outcome)| match outcome {
            FileOutcome::Done => None,
            FileOutcome::Failed(reason) => {
                warn!(path = %describe(item), error = %reason, "File operation failed");
                Some((item, reason.as_str()))
            }
        })
        .collect()
}
