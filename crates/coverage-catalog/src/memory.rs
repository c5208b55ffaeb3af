//! Process-wide byte budget for strongly retained coverages.
//!
//! Every decoded coverage is recorded here with its byte size. When the
//! running total exceeds the budget, the least recently used entries are
//! demoted: their coverage is then only weakly retained, and freed as soon
//! as no caller holds it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use metrics::{counter, gauge};
use tracing::{debug, info};

use coverage_common::CatalogConfig;

use crate::entry::CoverageEntry;
use crate::lock;

/// Counters describing cache behaviour.
#[derive(Debug, Default)]
pub struct MemoryStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub decodes: AtomicU64,
    pub demotions: AtomicU64,
    pub aborts: AtomicU64,
}

impl MemoryStats {
    /// Fraction of coverage requests served from cache, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

struct Tracked {
    entry: Weak<CoverageEntry>,
    bytes: usize,
}

struct RecentlyUsed {
    list: LruCache<u64, Tracked>,
    total: usize,
}

/// The recently-used list shared by every catalog of a process.
pub struct CoverageMemory {
    budget: usize,
    recent: Mutex<RecentlyUsed>,
    stats: MemoryStats,
}

impl CoverageMemory {
    /// Create a list with a budget in bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            recent: Mutex::new(RecentlyUsed {
                list: LruCache::unbounded(),
                total: 0,
            }),
            stats: MemoryStats::default(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.memory_budget_bytes())
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes of coverages currently retained strongly.
    pub fn total_bytes(&self) -> usize {
        lock(&self.recent).total
    }

    pub fn tracked_entries(&self) -> usize {
        lock(&self.recent).list.len()
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Record a freshly retained coverage, demoting older entries when the
    /// budget is exceeded. The recorded entry itself is never demoted.
    pub(crate) fn record(&self, entry: &Arc<CoverageEntry>, bytes: usize) {
        let id = entry.id();
        let mut demote = Vec::new();
        let total = {
            let mut recent = lock(&self.recent);
            let tracked = Tracked {
                entry: Arc::downgrade(entry),
                bytes,
            };
            if let Some(previous) = recent.list.put(id, tracked) {
                recent.total = recent.total.saturating_sub(previous.bytes);
            }
            recent.total += bytes;

            while recent.total > self.budget {
                match recent.list.peek_lru() {
                    Some((oldest, _)) if *oldest != id => {}
                    _ => break,
                }
                if let Some((_, oldest)) = recent.list.pop_lru() {
                    recent.total = recent.total.saturating_sub(oldest.bytes);
                    demote.push(oldest);
                }
            }
            recent.total
        };

        self.demote_all(demote);
        gauge!("coverage_cache_bytes").set(total as f64);
        debug!(entry = %entry.name(), bytes, total, budget = self.budget, "Recorded coverage");
    }

    /// Mark an entry as most recently used.
    pub(crate) fn touch(&self, id: u64) {
        let _ = lock(&self.recent).list.get(&id);
    }

    /// Stop tracking an entry that is being dropped.
    pub(crate) fn forget(&self, id: u64) {
        let mut recent = lock(&self.recent);
        if let Some(tracked) = recent.list.pop(&id) {
            recent.total = recent.total.saturating_sub(tracked.bytes);
            gauge!("coverage_cache_bytes").set(recent.total as f64);
        }
    }

    /// Demote every tracked entry. Returns the number of entries demoted.
    ///
    /// This is the hook for forced reclamation: afterwards a coverage stays
    /// alive only while a caller holds it.
    pub fn release_all(&self) -> usize {
        let drained = {
            let mut recent = lock(&self.recent);
            recent.total = 0;
            let mut drained = Vec::with_capacity(recent.list.len());
            while let Some((_, tracked)) = recent.list.pop_lru() {
                drained.push(tracked);
            }
            drained
        };
        gauge!("coverage_cache_bytes").set(0.0);
        self.demote_all(drained)
    }

    fn demote_all(&self, tracked: Vec<Tracked>) -> usize {
        let mut demoted = 0;
        for t in tracked {
            let Some(entry) = t.entry.upgrade() else { continue };
            if entry.demote() {
                demoted += 1;
                info!(entry = %entry.name(), bytes = t.bytes, "Demoted coverage to weak retention");
            }
        }
        if demoted > 0 {
            self.stats.demotions.fetch_add(demoted as u64, Ordering::Relaxed);
            counter!("coverage_demotions_total").increment(demoted as u64);
        }
        demoted
    }

    pub(crate) fn record_hit(&self) {
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        counter!("coverage_cache_hits_total").increment(1);
    }

    pub(crate) fn record_miss(&self) {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        counter!("coverage_cache_misses_total").increment(1);
    }

    pub(crate) fn record_decode(&self) {
        self.stats.decodes.fetch_add(1, Ordering::Relaxed);
        counter!("coverage_decodes_total").increment(1);
    }

    pub(crate) fn record_abort(&self) {
        self.stats.aborts.fetch_add(1, Ordering::Relaxed);
        counter!("coverage_aborts_total").increment(1);
    }
}

impl std::fmt::Debug for CoverageMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageMemory")
            .field("budget", &self.budget)
            .field("total", &self.total_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = MemoryStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits.store(3, Ordering::Relaxed);
        stats.misses.store(1, Ordering::Relaxed);
        assert!((stats.hit_rate() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_memory() {
        let memory = CoverageMemory::new(1024);
        assert_eq!(memory.total_bytes(), 0);
        assert_eq!(memory.release_all(), 0);
        memory.forget(42);
        assert_eq!(memory.tracked_entries(), 0);
    }
}
