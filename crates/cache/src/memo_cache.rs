//! MemoizationCache - Keyed, tag-invalidated, TTL-bounded view cache
//!
//! Entries carry the generation of each of their tags at the moment the
//! value was computed. `invalidate` bumps a tag's generation, so any entry
//! recorded under an older generation is stale without being touched.
//!
//! Two callers missing on the same key at the same time may both compute.
//! Compute functions here are cheap pure filters, so this is left
//! unserialized. Insertion itself is atomic: an entry is fully built before
//! it is placed in the map under the write lock.

use crate::stats::{CacheStats, PerformanceSnapshot};
use shared::{DataDomain, Millis, Role, TimeSource};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Invalidation handle attached to cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// Every role's view of a domain
    Domain(DataDomain),
    /// One role's view of a domain
    RoleDomain(Role, DataDomain),
}

impl From<DataDomain> for CacheTag {
    fn from(domain: DataDomain) -> Self {
        CacheTag::Domain(domain)
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Domain(d) => write!(f, "{}", d),
            CacheTag::RoleDomain(r, d) => write!(f, "{}:{}", r, d),
        }
    }
}

/// Identity of a cached view. `fingerprint` changes whenever the
/// underlying input changes, so a data change is always a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub role: Role,
    pub domain: DataDomain,
    pub fingerprint: u64,
}

impl CacheKey {
    pub fn new(role: Role, domain: DataDomain, fingerprint: u64) -> Self {
        Self {
            role,
            domain,
            fingerprint,
        }
    }
}

/// Anything whose cached state can be invalidated by tag
pub trait TagInvalidator: Send + Sync {
    fn invalidate(&self, tag: CacheTag);
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    tags: Vec<(CacheTag, u64)>,
    created_at: Millis,
    ttl_ms: u64,
    sequence: u64,
}

impl<V> CacheEntry<V> {
    fn expires_at(&self) -> Millis {
        self.created_at.saturating_add(self.ttl_ms)
    }

    fn is_expired(&self, now: Millis) -> bool {
        now >= self.expires_at()
    }

    fn is_stale(&self, generations: &HashMap<CacheTag, u64>) -> bool {
        self.tags
            .iter()
            .any(|(tag, seen)| generations.get(tag).copied().unwrap_or(0) != *seen)
    }
}

pub struct MemoizationCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    generations: RwLock<HashMap<CacheTag, u64>>,
    max_entries: AtomicUsize,
    sequence: AtomicU64,
    time: Arc<dyn TimeSource>,
    stats: CacheStats,
}

impl<V: Clone> MemoizationCache<V> {
    /// Create a cache with a soft cap of `max_entries`
    pub fn new(max_entries: usize, time: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generations: RwLock::new(HashMap::new()),
            max_entries: AtomicUsize::new(max_entries.max(1)),
            sequence: AtomicU64::new(0),
            time,
            stats: CacheStats::default(),
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// A cached value is returned only if it is unexpired and none of its
    /// tags were invalidated since it was computed.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F, tags: &[CacheTag], ttl: Duration) -> V
    where
        F: FnOnce() -> V,
    {
        match self.try_get_or_compute(key, || Ok::<V, std::convert::Infallible>(compute()), tags, ttl) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of `get_or_compute`. A failed compute stores nothing.
    pub fn try_get_or_compute<F, E>(
        &self,
        key: CacheKey,
        compute: F,
        tags: &[CacheTag],
        ttl: Duration,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.lookup(&key) {
            self.stats.record_hit();
            return Ok(value);
        }
        self.stats.record_miss();

        // Generations are captured before computing: an invalidation that
        // lands mid-compute leaves the new entry already stale.
        let tag_generations = self.snapshot_generations(tags);
        let created_at = self.time.now_millis();

        let started = Instant::now();
        let value = compute()?;
        self.stats.record_recompute(started.elapsed());

        let entry = CacheEntry {
            value: value.clone(),
            tags: tag_generations,
            created_at,
            ttl_ms: ttl.as_millis() as u64,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.write_entries();
        entries.insert(key, entry);
        let cap = self.max_entries.load(Ordering::Relaxed);
        if entries.len() > cap {
            self.evict(&mut entries, cap);
        }

        Ok(value)
    }

    /// Mark every entry carrying `tag` as stale
    pub fn invalidate(&self, tag: impl Into<CacheTag>) {
        let tag = tag.into();
        let mut generations = self
            .generations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *generations.entry(tag).or_insert(0) += 1;
        self.stats.record_invalidation();
        debug!(%tag, "cache tag invalidated");
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.write_entries().clear();
        debug!("cache cleared");
    }

    /// Remove expired and stale entries; returns how many were removed
    pub fn purge_stale(&self) -> usize {
        let now = self.time.now_millis();
        let mut entries = self.write_entries();
        let generations = self.read_generations();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now) && !e.is_stale(&generations));
        before - entries.len()
    }

    /// Change the soft cap; applied on the next insertion
    pub fn set_max_entries(&self, max_entries: usize) {
        self.max_entries.store(max_entries.max(1), Ordering::Relaxed);
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.load(Ordering::Relaxed)
    }

    /// Number of stored entries, including ones not yet purged
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current generation of a tag (0 if never invalidated)
    pub fn generation(&self, tag: impl Into<CacheTag>) -> u64 {
        self.read_generations().get(&tag.into()).copied().unwrap_or(0)
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.stats.snapshot(self.len())
    }

    fn lookup(&self, key: &CacheKey) -> Option<V> {
        let now = self.time.now_millis();
        let entries = self.read_entries();
        let entry = entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        let generations = self.read_generations();
        if entry.is_stale(&generations) {
            return None;
        }
        Some(entry.value.clone())
    }

    fn snapshot_generations(&self, tags: &[CacheTag]) -> Vec<(CacheTag, u64)> {
        let generations = self.read_generations();
        tags.iter()
            .map(|t| (*t, generations.get(t).copied().unwrap_or(0)))
            .collect()
    }

    /// Expired and stale entries go first, then those nearest to expiry
    /// (oldest insertion breaks ties) until the map is back under `cap`.
    fn evict(&self, entries: &mut HashMap<CacheKey, CacheEntry<V>>, cap: usize) {
        let now = self.time.now_millis();
        let before = entries.len();
        {
            let generations = self.read_generations();
            entries.retain(|_, e| !e.is_expired(now) && !e.is_stale(&generations));
        }

        if entries.len() > cap {
            let mut order: Vec<(Millis, u64, CacheKey)> = entries
                .iter()
                .map(|(k, e)| (e.expires_at(), e.sequence, *k))
                .collect();
            order.sort_unstable_by_key(|&(expires_at, sequence, _)| (expires_at, sequence));
            let excess = entries.len() - cap;
            for (_, _, key) in order.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        let evicted = before - entries.len();
        self.stats.record_evictions(evicted as u64);
        debug!(evicted, remaining = entries.len(), "cache over soft cap");
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_generations(&self) -> RwLockReadGuard<'_, HashMap<CacheTag, u64>> {
        self.generations.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone + Send + Sync> TagInvalidator for MemoizationCache<V> {
    fn invalidate(&self, tag: CacheTag) {
        MemoizationCache::invalidate(self, tag);
    }
}

impl<V> fmt::Debug for MemoizationCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizationCache")
            .field("max_entries", &self.max_entries.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
