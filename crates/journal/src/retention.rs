//! Cache retention: oldest-first eviction down to a byte budget

use stash_core::{CacheEntry, ContentDigest};

/// Purge configuration
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Largest total size the cache may keep after a purge
    pub max_cache_bytes: u64,
}

/// Entries chosen for eviction, oldest first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgePlan {
    pub evict: Vec<ContentDigest>,
    pub evicted_bytes: u64,
    pub remaining_bytes: u64,
}

impl RetentionPolicy {
    pub fn new(max_cache_bytes: u64) -> Self {
        Self { max_cache_bytes }
    }

    /// Pick entries to evict
    ///
    /// Entries are taken strictly in ascending sequence number order until
    /// the remaining total fits the budget. Entries sharing a sequence
    /// number are ordered by cache id so the choice is repeatable.
    pub fn select<'a>(&self, entries: impl IntoIterator<Item = &'a CacheEntry>) -> PurgePlan {
        let mut ordered: Vec<&CacheEntry> = entries.into_iter().collect();
        ordered.sort_by_key(|e| (e.sequence_number, e.cache_id));

        let mut plan = PurgePlan {
            remaining_bytes: ordered.iter().map(|e| entry_size(e)).sum(),
            ..Default::default()
        };
        for entry in ordered {
            if plan.remaining_bytes <= self.max_cache_bytes {
                break;
            }
            plan.remaining_bytes -= entry_size(entry);
            plan.evicted_bytes += entry_size(entry);
            plan.evict.push(entry.content_id.clone());
        }
        plan
    }
}

fn entry_size(entry: &CacheEntry) -> u64 {
    entry.length.max(0) as u64
}
