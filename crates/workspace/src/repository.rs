//! The repository: a cache of content-addressed files plus one staged
//! workspace, kept consistent across crashes
//!
//! On-disk layout under the base directory:
//! ```text
//! Repository.sig           signature, written last by `create`
//! Repository.dat           durable state (+ `.transaction` backup)
//! config.toml              repository configuration
//! Cache/X/X/X/<id>         cached files, by 64-bit cache id
//! Sync/                    the workspace
//! ```
//!
//! Every phase that touches files persists a dirty state before the first
//! destructive operation and a clean state once it has finished. A crash in
//! between is recovered by `repair` (run automatically on the next load).

use crate::add::{plan_addition, AdditionPlan, FileToCopy, FileToSync};
use crate::config::{RepositoryConfig, CONFIG_FILE_NAME};
use crate::pool::{build_pool, failures, run_all};
use crate::reconcile::{self, Difference};
use crate::remove::{directory_levels, plan_removal, RemovalPlan};
use crate::stats::StatsTable;
use crate::tree::WorkspaceTree;
use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result};
use depot::{describe_snapshot, resolve_change, Change, FetchRequest, RemoteSource, ViewFilter};
use journal::{signature, state, DurableState, PurgePlan, RetentionPolicy, TransactionState};
use rayon::prelude::*;
use rayon::ThreadPool;
use stash_core::cache::create_hierarchy;
use stash_core::fsutil::{copy_file, delete_directory_contents, force_delete_file, force_move_file};
use stash_core::{CacheEntry, CacheIndex, ContentDigest, FileStamp, RemoteTreeSnapshot};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

const MIB: f64 = 1024.0 * 1024.0;

/// Well-known paths below a repository's base directory
#[derive(Debug, Clone)]
pub struct RepositoryPaths {
    pub base_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub data_file: PathBuf,
    pub signature_file: PathBuf,
    pub config_file: PathBuf,
}

impl RepositoryPaths {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            cache_dir: base_dir.join("Cache"),
            workspace_dir: base_dir.join("Sync"),
            data_file: base_dir.join("Repository.dat"),
            signature_file: base_dir.join("Repository.sig"),
            config_file: base_dir.join(CONFIG_FILE_NAME),
        }
    }
}

/// Arguments to [`Repository::sync`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub stream: String,
    pub change: Change,
    pub filters: Vec<String>,
    /// Write empty placeholders instead of fetching content
    pub fake: bool,
    /// Snapshot file shared between machines syncing the same change
    pub cache_file: Option<PathBuf>,
}

impl SyncOptions {
    pub fn new(stream: impl Into<String>, change: Change) -> Self {
        Self {
            stream: stream.into(),
            change,
            filters: Vec::new(),
            fake: false,
            cache_file: None,
        }
    }
}

/// What a removal phase did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    pub moved_to_cache: usize,
    pub deleted: usize,
    pub directories_deleted: usize,
}

/// What an addition phase did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdditionSummary {
    pub moved_from_cache: usize,
    pub copied: usize,
    pub synced: usize,
    pub synced_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub change: u32,
    pub removed: RemovalSummary,
    pub added: AdditionSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    /// Bytes of distinct content across all streams
    pub total_bytes: u64,
    /// Bytes of content not shared by every stream
    pub difference_bytes: u64,
    pub evicted_entries: usize,
}

/// Counts and local changes reported by `status`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub cache_files: usize,
    pub cache_bytes: u64,
    pub workspace_files: usize,
    pub workspace_bytes: u64,
    pub differences: Vec<Difference>,
}

pub struct Repository {
    paths: RepositoryPaths,
    config: RepositoryConfig,
    pool: ThreadPool,
    cache: CacheIndex,
    workspace: WorkspaceTree,
    next_sequence_number: u32,
    requires_repair: AtomicBool,
}

impl Repository {
    fn with_state(
        paths: RepositoryPaths,
        config: RepositoryConfig,
        cache: CacheIndex,
        workspace: WorkspaceTree,
        next_sequence_number: u32,
        requires_repair: bool,
    ) -> Result<Self> {
        let pool = build_pool(config.sync.threads)?;
        Ok(Self {
            paths,
            config,
            pool,
            cache,
            workspace,
            next_sequence_number,
            requires_repair: AtomicBool::new(requires_repair),
        })
    }

    /// Create a new, empty repository, wiping anything already at `base_dir`
    pub fn create(base_dir: &Path, config: RepositoryConfig) -> Result<Self> {
        let timer = Instant::now();
        let paths = RepositoryPaths::new(base_dir);
        info!(base_dir = %base_dir.display(), "Creating repository");

        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create {}", base_dir.display()))?;
        delete_directory_contents(base_dir)?;

        config.save(&paths.config_file)?;
        let repo = Self::with_state(paths, config, CacheIndex::new(), WorkspaceTree::new(), 1, false)?;
        repo.save(TransactionState::Clean)?;

        create_hierarchy(&repo.paths.cache_dir)?;
        fs::create_dir_all(&repo.paths.workspace_dir)?;

        // Only a fully created repository gets a signature
        signature::write(&repo.paths.signature_file)?;

        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Repository created");
        Ok(repo)
    }

    /// Whether a valid repository exists at `base_dir`
    pub fn exists(base_dir: &Path) -> bool {
        signature::matches(&RepositoryPaths::new(base_dir).signature_file)
    }

    /// Open an existing repository, recovering from any interrupted write
    pub fn load(base_dir: &Path) -> Result<Self> {
        let paths = RepositoryPaths::new(base_dir);
        signature::verify(&paths.signature_file)?;

        let config = RepositoryConfig::load(&paths.config_file)?;
        let saved = state::load::<WorkspaceTree>(&paths.data_file)?;
        let cache = CacheIndex::from_entries(saved.cache_entries)
            .with_context(|| format!("Invalid cache index in {}", paths.data_file.display()))?;

        debug!(
            cache_entries = cache.len(),
            workspace_files = saved.workspace.file_count(),
            next_sequence_number = saved.next_sequence_number,
            requires_repair = saved.requires_repair,
            "Loaded repository state"
        );

        let mut repo = Self::with_state(
            paths,
            config,
            cache,
            saved.workspace,
            saved.next_sequence_number,
            saved.requires_repair,
        )?;
        repo.run_optional_repair()?;
        Ok(repo)
    }

    pub fn paths(&self) -> &RepositoryPaths {
        &self.paths
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheIndex {
        &self.cache
    }

    pub fn workspace(&self) -> &WorkspaceTree {
        &self.workspace
    }

    pub fn next_sequence_number(&self) -> u32 {
        self.next_sequence_number
    }

    pub fn requires_repair(&self) -> bool {
        self.requires_repair.load(Ordering::SeqCst)
    }

    fn mark_requires_repair(&self) {
        self.requires_repair.store(true, Ordering::SeqCst);
    }

    fn save(&self, mode: TransactionState) -> Result<()> {
        let durable = DurableState {
            requires_repair: self.requires_repair(),
            next_sequence_number: self.next_sequence_number,
            cache_entries: self.cache.by_sequence().into_iter().cloned().collect(),
            workspace: &self.workspace,
        };
        state::save(&self.paths.data_file, &durable, mode)
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Bring the workspace back in line with the ledger
    pub fn clean(&mut self, remove_untracked: bool) -> Result<()> {
        let timer = Instant::now();
        info!("Cleaning workspace");
        self.clean_internal(remove_untracked)?;
        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Clean complete");
        Ok(())
    }

    fn clean_internal(&mut self, remove_untracked: bool) -> Result<()> {
        let timer = Instant::now();
        let root = self.paths.workspace_dir.clone();
        let current = self.workspace.clone();
        let scan = self
            .pool
            .install(|| reconcile::scan(current, &root, remove_untracked))?;
        debug!(
            differences = scan.differences.len(),
            elapsed_secs = timer.elapsed().as_secs_f64(),
            "Scanned workspace"
        );

        if scan.differences.is_empty() {
            return Ok(());
        }
        for difference in &scan.differences {
            info!("  {difference}");
        }

        let file_outcomes = run_all(&self.pool, &scan.files_to_delete, |path| force_delete_file(path));
        failures(&scan.files_to_delete, &file_outcomes, |p| p.display().to_string());
        let dir_outcomes = run_all(&self.pool, &scan.directories_to_delete, |path| {
            stash_core::fsutil::force_delete_directory(path)
        });
        failures(&scan.directories_to_delete, &dir_outcomes, |p| p.display().to_string());

        self.workspace = scan.new_tree;
        self.save(TransactionState::Clean)
    }

    /// Empty the workspace, keeping its content in the cache
    pub fn clear(&mut self) -> Result<()> {
        let timer = Instant::now();
        info!("Clearing workspace");
        self.clean_internal(true)?;
        self.remove_files_from_workspace(&RemoteTreeSnapshot::new())?;
        self.save(TransactionState::Clean)?;
        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Clear complete");
        Ok(())
    }

    /// Cache and workspace totals plus local changes; touches nothing
    pub fn status(&self) -> Result<StatusReport> {
        let scan = self.pool.install(|| {
            reconcile::scan(self.workspace.clone(), &self.paths.workspace_dir, false)
        })?;
        Ok(StatusReport {
            cache_files: self.cache.len(),
            cache_bytes: self.cache.total_size(),
            workspace_files: self.workspace.file_count(),
            workspace_bytes: self.workspace.total_size(),
            differences: scan.differences,
        })
    }

    /// One line per staged file and per cache entry, sorted
    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();

        let mut files = self.workspace.files();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        if !files.is_empty() {
            lines.push("Workspace:".to_owned());
        }
        for (path, file) in files {
            lines.push(format!(
                "  {:<64} [{}] [{:>14}] [{:>20}]{}",
                path,
                file.content_id,
                file.length,
                file.last_modified_ticks,
                if file.read_only { "" } else { " [ writable ]" }
            ));
        }

        let mut entries: Vec<&CacheEntry> = self.cache.iter().collect();
        entries.sort_by_key(|e| e.cache_id);
        if !entries.is_empty() {
            lines.push("Cache:".to_owned());
        }
        for entry in entries {
            lines.push(format!(
                "  {} [{}] [{:>14}] [{:>20}] [seq {}]{}",
                entry.path(&self.paths.cache_dir).display(),
                entry.content_id,
                entry.length,
                entry.last_modified_ticks,
                entry.sequence_number,
                if entry.read_only { "" } else { " [ writable ]" }
            ));
        }

        for line in &lines {
            debug!("{line}");
        }
        lines
    }

    /// Drop every cache entry whose file is missing or has changed
    pub fn repair(&mut self) -> Result<usize> {
        let timer = Instant::now();
        info!(entries = self.cache.len(), "Checking cache");
        create_hierarchy(&self.paths.cache_dir)?;

        let cache_dir = &self.paths.cache_dir;
        let entries: Vec<&CacheEntry> = self.cache.iter().collect();
        let invalid: Vec<ContentDigest> = self.pool.install(|| {
            entries
                .par_iter()
                .filter(|entry| !entry.check_integrity(cache_dir))
                .map(|entry| entry.content_id.clone())
                .collect()
        });

        for content_id in &invalid {
            if let Some(entry) = self.cache.remove(content_id) {
                warn!(content = %content_id, cache_id = %format!("{:016X}", entry.cache_id), "Dropping invalid cache entry");
                if let Err(err) = force_delete_file(&entry.path(&self.paths.cache_dir)) {
                    warn!(error = %format!("{err:#}"), "Unable to delete invalid cache file");
                }
            }
        }

        self.requires_repair.store(false, Ordering::SeqCst);
        self.save(TransactionState::Clean)?;
        info!(
            removed = invalid.len(),
            remaining = self.cache.len(),
            elapsed_secs = timer.elapsed().as_secs_f64(),
            "Cache check complete"
        );
        Ok(invalid.len())
    }

    fn run_optional_repair(&mut self) -> Result<()> {
        if self.requires_repair() {
            self.repair()?;
        }
        Ok(())
    }

    /// Shrink the cache to at most `max_bytes`, oldest entries first
    pub fn purge(&mut self, max_bytes: u64) -> Result<PurgePlan> {
        info!(limit_bytes = max_bytes, "Purging cache");
        let plan = RetentionPolicy::new(max_bytes).select(self.cache.iter());
        self.remove_cache_entries(&plan.evict)?;
        self.save(TransactionState::Clean)?;
        info!(
            removed = plan.evict.len(),
            remaining = self.cache.len(),
            size_bytes = plan.remaining_bytes,
            "Purge complete"
        );
        Ok(plan)
    }

    /// Unindex entries, persist, then delete their files
    fn remove_cache_entries(&mut self, content_ids: &[ContentDigest]) -> Result<usize> {
        let removed: Vec<PathBuf> = content_ids
            .iter()
            .filter_map(|id| self.cache.remove(id))
            .map(|entry| entry.path(&self.paths.cache_dir))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }

        self.save(TransactionState::Dirty)?;
        let outcomes = run_all(&self.pool, &removed, |path| force_delete_file(path));
        if !failures(&removed, &outcomes, |p| p.display().to_string()).is_empty() {
            self.mark_requires_repair();
        }
        Ok(removed.len())
    }

    pub fn revert(&self, source: &dyn RemoteSource) -> Result<()> {
        let timer = Instant::now();
        source.revert()?;
        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Revert complete");
        Ok(())
    }

    pub fn setup(&self, source: &dyn RemoteSource, stream: &str) -> Result<()> {
        source.setup(stream)
    }

    // ---------------------------------------------------------------------
    // Sync
    // ---------------------------------------------------------------------

    /// Make the workspace hold exactly the stream's files at `change`
    pub fn sync(&mut self, source: &dyn RemoteSource, options: &SyncOptions) -> Result<SyncSummary> {
        let timer = Instant::now();
        info!(stream = %options.stream, change = %options.change, "Syncing");

        self.run_optional_repair()?;
        source.setup(&options.stream)?;
        let change = resolve_change(source, &options.stream, options.change)?;
        source.revert()?;

        self.clean_internal(self.config.clean.remove_untracked)?;

        let filter = ViewFilter::new(&options.filters)?;
        let contents = match &options.cache_file {
            Some(cache_file) if cache_file.exists() => {
                let contents = RemoteTreeSnapshot::load(cache_file)?;
                info!(path = %cache_file.display(), files = contents.file_count(), "Loaded stream contents");
                contents
            }
            Some(cache_file) => {
                let contents = self.find_contents(source, &options.stream, change, &filter, options.fake)?;
                contents.save_atomically(cache_file)?;
                debug!(path = %cache_file.display(), "Saved stream contents");
                contents
            }
            None => self.find_contents(source, &options.stream, change, &filter, options.fake)?,
        };

        let removed = self.remove_files_from_workspace(&contents)?;
        let added = self.add_files_to_workspace(source, &contents, options.fake)?;

        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Sync complete");
        Ok(SyncSummary { change, removed, added })
    }

    fn find_contents(
        &self,
        source: &dyn RemoteSource,
        stream: &str,
        change: u32,
        filter: &ViewFilter,
        fake: bool,
    ) -> Result<RemoteTreeSnapshot> {
        let timer = Instant::now();
        let contents = describe_snapshot(source, stream, change, filter, fake)?;
        info!(
            stream,
            change,
            files = contents.file_count(),
            size_mib = contents.total_size() as f64 / MIB,
            elapsed_secs = timer.elapsed().as_secs_f64(),
            "Found stream contents"
        );
        Ok(contents)
    }

    /// Evict every staged file `contents` doesn't want, parking content in the cache
    fn remove_files_from_workspace(&mut self, contents: &RemoteTreeSnapshot) -> Result<RemovalSummary> {
        self.run_optional_repair()?;

        let timer = Instant::now();
        let current = self.workspace.clone();
        let cache = self.cache.entries();
        let RemovalPlan {
            new_tree,
            files_to_move,
            files_to_delete,
            directories_to_delete,
        } = self.pool.install(|| plan_removal(current, contents, cache));
        debug!(
            moves = files_to_move.len(),
            deletes = files_to_delete.len(),
            directories = directories_to_delete.len(),
            elapsed_secs = timer.elapsed().as_secs_f64(),
            "Gathered files to remove"
        );

        let workspace_dir = self.paths.workspace_dir.clone();
        let mut summary = RemovalSummary::default();

        if !files_to_move.is_empty() {
            let timer = Instant::now();
            let sequence_number = self.next_sequence_number;
            let mut moves: Vec<(PathBuf, PathBuf, ContentDigest)> = Vec::with_capacity(files_to_move.len());
            for (content_id, staged) in files_to_move {
                let entry = CacheEntry {
                    cache_id: self.cache.allocate_id(&content_id),
                    content_id: content_id.clone(),
                    length: staged.file.length,
                    last_modified_ticks: staged.file.last_modified_ticks,
                    read_only: staged.file.read_only,
                    sequence_number,
                };
                moves.push((workspace_dir.join(&staged.path), entry.path(&self.paths.cache_dir), content_id));
                self.cache.insert(entry);
            }
            self.next_sequence_number = self.next_sequence_number.wrapping_add(1);

            // Until the moves finish each file may be in either place
            self.save(TransactionState::Dirty)?;

            let outcomes = run_all(&self.pool, &moves, |(from, to, _)| force_move_file(from, to));
            let failed: Vec<ContentDigest> = failures(&moves, &outcomes, |(from, _, _)| from.display().to_string())
                .into_iter()
                .map(|((_, _, content_id), _)| content_id.clone())
                .collect();
            for content_id in &failed {
                self.cache.remove(content_id);
                self.mark_requires_repair();
            }
            summary.moved_to_cache = moves.len() - failed.len();
            info!(
                files = summary.moved_to_cache,
                failed = failed.len(),
                elapsed_secs = timer.elapsed().as_secs_f64(),
                "Moved files to cache"
            );
        }

        if !files_to_delete.is_empty() {
            let timer = Instant::now();
            let paths: Vec<PathBuf> = files_to_delete.iter().map(|f| workspace_dir.join(&f.path)).collect();
            let outcomes = run_all(&self.pool, &paths, |path| force_delete_file(path));
            let failed = failures(&paths, &outcomes, |p| p.display().to_string()).len();
            if failed > 0 {
                self.mark_requires_repair();
            }
            summary.deleted = paths.len() - failed;
            info!(
                files = summary.deleted,
                failed,
                elapsed_secs = timer.elapsed().as_secs_f64(),
                "Deleted files"
            );
        }

        for level in directory_levels(&directories_to_delete) {
            let outcomes: Vec<Result<bool>> = self.pool.install(|| {
                level
                    .par_iter()
                    .map(|dir| remove_empty_directory(&workspace_dir.join(dir)))
                    .collect()
            });
            for (dir, outcome) in level.iter().zip(outcomes) {
                match outcome {
                    Ok(removed) => summary.directories_deleted += usize::from(removed),
                    Err(err) => {
                        warn!(path = %dir, error = %format!("{err:#}"), "Unable to delete directory");
                        self.mark_requires_repair();
                    }
                }
            }
        }

        self.workspace = new_tree;
        self.save(TransactionState::Clean)?;
        Ok(summary)
    }

    /// Bring in every file `contents` wants that the workspace doesn't have
    fn add_files_to_workspace(
        &mut self,
        source: &dyn RemoteSource,
        contents: &RemoteTreeSnapshot,
        fake: bool,
    ) -> Result<AdditionSummary> {
        self.run_optional_repair()?;

        let timer = Instant::now();
        let current = std::mem::take(&mut self.workspace);
        let cache = self.cache.entries();
        let AdditionPlan {
            new_tree,
            files_to_move,
            files_to_copy,
            mut files_to_sync,
            files_to_duplicate,
        } = self.pool.install(|| plan_addition(current, contents, cache));
        self.workspace = new_tree;
        self.save(TransactionState::Dirty)?;
        debug!(
            moves = files_to_move.len(),
            copies = files_to_copy.len(),
            syncs = files_to_sync.len(),
            duplicates = files_to_duplicate.len(),
            elapsed_secs = timer.elapsed().as_secs_f64(),
            "Gathered files to add"
        );

        let workspace_dir = self.paths.workspace_dir.clone();
        let cache_dir = self.paths.cache_dir.clone();
        let mut summary = AdditionSummary::default();

        if !files_to_move.is_empty() {
            let timer = Instant::now();
            let outcomes = run_all(&self.pool, &files_to_move, |file| {
                force_move_file(&file.cache_entry.path(&cache_dir), &workspace_dir.join(&file.path))
            });
            for file in &files_to_move {
                self.cache.remove(&file.cache_entry.content_id);
            }
            for (file, reason) in failures(&files_to_move, &outcomes, |f| f.path.clone()) {
                debug!(path = %file.path, error = %reason, "Syncing instead of moving from cache");
                files_to_sync.push(FileToSync {
                    path: file.path.clone(),
                    locator: file.locator.clone(),
                    content_id: file.cache_entry.content_id.clone(),
                    length: file.cache_entry.length,
                });
                self.mark_requires_repair();
            }
            summary.moved_from_cache = outcomes.iter().filter(|o| o.is_done()).count();
            info!(
                files = summary.moved_from_cache,
                elapsed_secs = timer.elapsed().as_secs_f64(),
                "Moved files from cache"
            );
        }

        if !files_to_copy.is_empty() {
            let (copied, fallback) = self.copy_files(&files_to_copy);
            summary.copied += copied;
            files_to_sync.extend(fallback);
        }

        if !files_to_sync.is_empty() {
            let (count, bytes) = self.sync_files(source, &files_to_sync, fake)?;
            summary.synced = count;
            summary.synced_bytes = bytes;
        }

        if !files_to_duplicate.is_empty() {
            let (copied, fallback) = self.copy_files(&files_to_duplicate);
            summary.copied += copied;
            if !fallback.is_empty() {
                let (count, bytes) = self.sync_files(source, &fallback, fake)?;
                summary.synced += count;
                summary.synced_bytes += bytes;
            }
        }

        self.save(TransactionState::Clean)?;
        Ok(summary)
    }

    /// Copy files within the workspace, returning how many were copied and
    /// the ones that must be synced instead
    fn copy_files(&mut self, files: &[FileToCopy]) -> (usize, Vec<FileToSync>) {
        let timer = Instant::now();
        let workspace_dir = self.paths.workspace_dir.clone();
        let stamps: Vec<Result<FileStamp>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let target = workspace_dir.join(&file.target);
                    copy_file(&workspace_dir.join(&file.source), &target)?;
                    FileStamp::read(&target)
                })
                .collect()
        });

        let mut copied = 0;
        let mut fallback = Vec::new();
        for (file, stamp) in files.iter().zip(stamps) {
            match stamp {
                Ok(stamp) => {
                    if let Some(staged) = self.workspace.file_mut(&file.target) {
                        staged.apply_stamp(stamp);
                    }
                    copied += 1;
                }
                Err(err) => {
                    warn!(source = %file.source, target = %file.target, error = %format!("{err:#}"), "Unable to copy file, syncing instead");
                    fallback.push(FileToSync {
                        path: file.target.clone(),
                        locator: file.locator.clone(),
                        content_id: file.content_id.clone(),
                        length: file.length,
                    });
                    self.mark_requires_repair();
                }
            }
        }
        info!(files = copied, elapsed_secs = timer.elapsed().as_secs_f64(), "Copied files within workspace");
        (copied, fallback)
    }

    /// Fetch files in byte-bounded batches, persisting after each one
    fn sync_files(&mut self, source: &dyn RemoteSource, files: &[FileToSync], fake: bool) -> Result<(usize, u64)> {
        let timer = Instant::now();
        let total_bytes: u64 = files.iter().map(|f| f.length.max(0) as u64).sum();
        let batch_limit = self.config.sync.batch_size_bytes;
        let workspace_dir = self.paths.workspace_dir.clone();
        info!(files = files.len(), size_mib = total_bytes as f64 / MIB, "Syncing files");

        let mut synced_bytes = 0u64;
        let mut end = 0;
        while end < files.len() {
            let begin = end;
            let mut batch_bytes = 0u64;
            while end < files.len() && batch_bytes < batch_limit {
                batch_bytes += files[end].length.max(0) as u64;
                end += 1;
            }
            let batch = &files[begin..end];

            let percent = if total_bytes == 0 {
                100.0 * begin as f64 / files.len() as f64
            } else {
                100.0 * synced_bytes as f64 / total_bytes as f64
            };
            info!(
                "{percent:.1}% ({:.1} MiB/{:.1} MiB)",
                synced_bytes as f64 / MIB,
                total_bytes as f64 / MIB
            );
            debug!("Batch {begin}-{end}, {:.1} MiB:", batch_bytes as f64 / MIB);
            for file in batch {
                debug!("  {:<96} [{}]", file.locator, file.content_id);
            }

            if fake {
                let outcomes = run_all(&self.pool, batch, |file| {
                    write_placeholder(&workspace_dir.join(&file.path))
                });
                if !failures(batch, &outcomes, |f| f.path.clone()).is_empty() {
                    self.mark_requires_repair();
                }
            } else {
                let requests: Vec<FetchRequest> = batch
                    .iter()
                    .map(|file| FetchRequest {
                        locator: file.locator.clone(),
                        target: workspace_dir.join(&file.path),
                    })
                    .collect();
                source.fetch(&requests)?;
            }

            let stamps: Vec<Result<FileStamp>> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|file| FileStamp::read(&workspace_dir.join(&file.path)))
                    .collect()
            });
            for (file, stamp) in batch.iter().zip(stamps) {
                match stamp {
                    Ok(stamp) => {
                        if let Some(staged) = self.workspace.file_mut(&file.path) {
                            staged.apply_stamp(stamp);
                        }
                    }
                    Err(err) => {
                        warn!(path = %file.path, error = %format!("{err:#}"), "Synced file is unreadable");
                        self.mark_requires_repair();
                    }
                }
            }

            self.save(TransactionState::Dirty)?;
            synced_bytes += batch_bytes;
        }

        info!(
            "100% ({:.1} MiB) in {:.1}s",
            total_bytes as f64 / MIB,
            timer.elapsed().as_secs_f64()
        );
        Ok((files.len(), total_bytes))
    }

    // ---------------------------------------------------------------------
    // Multi-stream operations
    // ---------------------------------------------------------------------

    /// Head revision of each stream, in order
    fn latest_contents(
        &self,
        source: &dyn RemoteSource,
        streams: &[String],
        filter: &ViewFilter,
        fake: bool,
    ) -> Result<Vec<RemoteTreeSnapshot>> {
        streams
            .iter()
            .map(|stream| {
                source.setup(stream)?;
                let change = source.latest_change(stream)?;
                info!(stream = %stream, change, "Latest change");
                source.revert()?;
                self.find_contents(source, stream, change, filter, fake)
            })
            .collect()
    }

    /// Fill the cache with the head revision of every stream
    ///
    /// Afterwards the workspace holds the last stream and the cache holds
    /// everything the other streams need.
    pub fn populate(
        &mut self,
        source: &dyn RemoteSource,
        streams: &[String],
        filters: &[String],
        fake: bool,
    ) -> Result<PopulateSummary> {
        let timer = Instant::now();
        info!(streams = streams.len(), "Populating");

        self.clean_internal(self.config.clean.remove_untracked)?;
        let filter = ViewFilter::new(filters)?;
        let trees = self.latest_contents(source, streams, &filter, fake)?;

        // Prune to the first stream so content only other streams used can leave the cache
        if let Some(first) = trees.first() {
            self.remove_files_from_workspace(first)?;
        }

        let mut sizes: AHashMap<ContentDigest, u64> = AHashMap::new();
        let mut common: Option<AHashSet<ContentDigest>> = None;
        for tree in &trees {
            let stream_sizes = tree.content_sizes();
            let ids: AHashSet<ContentDigest> = stream_sizes.keys().cloned().collect();
            common = Some(match common {
                None => ids,
                Some(common) => common.intersection(&ids).cloned().collect(),
            });
            sizes.extend(stream_sizes);
        }

        let unreferenced: Vec<ContentDigest> = self
            .cache
            .iter()
            .filter(|entry| !sizes.contains_key(&entry.content_id))
            .map(|entry| entry.content_id.clone())
            .collect();
        let evicted_entries = self.remove_cache_entries(&unreferenced)?;

        let total_bytes: u64 = sizes.values().sum();
        let common_bytes: u64 = common
            .unwrap_or_default()
            .iter()
            .filter_map(|id| sizes.get(id))
            .sum();
        let summary = PopulateSummary {
            total_bytes,
            difference_bytes: total_bytes - common_bytes,
            evicted_entries,
        };
        info!(
            "{:.1} MiB total, {:.1} MiB differences",
            total_bytes as f64 / MIB,
            summary.difference_bytes as f64 / MIB
        );

        for (stream, tree) in streams.iter().zip(&trees) {
            info!(stream = %stream, "Syncing files");
            source.setup(stream)?;
            self.remove_files_from_workspace(tree)?;
            self.add_files_to_workspace(source, tree, fake)?;
        }

        self.save(TransactionState::Clean)?;
        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Populate complete");
        Ok(summary)
    }

    /// Bytes each stream holds that each other stream lacks
    pub fn stats(&self, source: &dyn RemoteSource, streams: &[String], filters: &[String]) -> Result<StatsTable> {
        let timer = Instant::now();
        info!(streams = streams.len(), "Finding stats");
        let filter = ViewFilter::new(filters)?;
        let trees = self.latest_contents(source, streams, &filter, false)?;
        let table = StatsTable::compute(streams.to_vec(), &trees);
        info!(elapsed_secs = timer.elapsed().as_secs_f64(), "Stats complete");
        Ok(table)
    }
}

/// Remove a directory that should already be empty; `false` if it was gone
fn remove_empty_directory(path: &Path) -> Result<bool> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

/// Write the empty stand-in for a file a fake sync skips
fn write_placeholder(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, b"").with_context(|| format!("Failed to write {}", target.display()))
}
