// crates/metadata-single-core/src/runtime/cache.rs
// ============================================================================
// Module: Metadata Cache Layer
// Description: Per-object metadata cache with batch read-through hydration.
// Purpose: Serve full object mappings without N+1 storage round trips.
// Dependencies: dashmap, tracing, crate::interfaces
// ============================================================================

//! ## Overview
//! [`MetaCache`] sits between the metadata store and a [`CacheService`]. An
//! entry is the complete mapping for one object or nothing at all; an empty
//! mapping means "cached, no metadata" and is distinct from "not cached".
//!
//! Invariants:
//! - Hydration issues at most one storage query per call, whatever the id count.
//! - Every requested id is cached after a successful hydration, including ids
//!   with no rows.
//! - Writers invalidate; entries are never patched in place.
//! - A hydration that overlaps an invalidation of the same key (or a flush of
//!   any group) never leaves its result in the cache.
//!
//! The last point is enforced with invalidation generations. Before the bulk
//! query the hydrator records a generation per missing key plus the flush
//! epoch. Writers bump the generation and then delete; the hydrator adds, then
//! re-reads the generation and removes its own entry if it moved. Either the
//! writer's delete lands after the add, or the hydrator sees the bump.
//! Generations live in hashed slots, so an unrelated bump may cause a skipped
//! fill but never a stale one. Stores that share a cache service must share
//! one [`MetaCache`] for this to hold across them.
//!
//! [`InMemoryCacheService`] is the process-local [`CacheService`] used when the
//! host does not supply one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::core::identifiers::ObjectId;
use crate::core::schema::StorageTarget;
use crate::core::value::ObjectMeta;
use crate::core::value::RawMetaValue;
use crate::interfaces::CacheKey;
use crate::interfaces::CacheService;
use crate::interfaces::SqlError;
use crate::interfaces::SqlExecutor;
use crate::runtime::error::MetaError;

// ============================================================================
// SECTION: In-Memory Cache Service
// ============================================================================

/// Process-local cache service backed by a concurrent map.
///
/// Unbounded by default. [`InMemoryCacheService::with_max_entries`] caps the
/// entry count; inserting into a full cache evicts an arbitrary entry, which
/// readers repair by hydrating again.
#[derive(Debug, Default)]
pub struct InMemoryCacheService {
    /// Cached mappings by key.
    entries: DashMap<CacheKey, Arc<ObjectMeta>>,
    /// Optional entry cap.
    max_entries: Option<usize>,
}

impl InMemoryCacheService {
    /// Creates an unbounded cache service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache service holding at most `max_entries` mappings.
    /// A cap of zero caches nothing.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: Some(max_entries),
        }
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evicts entries until there is room for one more.
    fn make_room(&self, max_entries: usize) {
        while self.entries.len() >= max_entries {
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl CacheService for InMemoryCacheService {
    fn get(&self, key: &CacheKey) -> Option<Arc<ObjectMeta>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn add(&self, key: CacheKey, entry: Arc<ObjectMeta>) -> bool {
        if let Some(max_entries) = self.max_entries {
            if max_entries == 0 {
                return false;
            }
            if !self.entries.contains_key(&key) {
                self.make_room(max_entries);
            }
        }
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    fn delete(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    fn flush_group(&self, group: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.group != group);
        before.saturating_sub(self.entries.len())
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Snapshot of cache layer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that required hydration.
    pub misses: u64,
    /// Bulk storage queries issued by hydration.
    pub hydration_queries: u64,
    /// Single-object invalidations.
    pub invalidations: u64,
    /// Whole-group flushes.
    pub group_flushes: u64,
    /// Hydrated entries not cached because a write overlapped the query.
    pub discarded_fills: u64,
}

/// Live counters behind [`CacheStats`].
#[derive(Debug, Default)]
struct CacheCounters {
    /// Lookups served from the cache.
    hits: AtomicU64,
    /// Lookups that required hydration.
    misses: AtomicU64,
    /// Bulk storage queries issued.
    hydration_queries: AtomicU64,
    /// Single-object invalidations.
    invalidations: AtomicU64,
    /// Whole-group flushes.
    group_flushes: AtomicU64,
    /// Hydrated entries discarded as stale.
    discarded_fills: AtomicU64,
}

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of hashed invalidation generation slots.
const GENERATION_SLOTS: u64 = 1024;

// ============================================================================
// SECTION: Cache Layer
// ============================================================================

/// Read-through, write-invalidate cache of per-object metadata mappings.
pub struct MetaCache {
    /// Backing cache service.
    service: Arc<dyn CacheService>,
    /// Operation counters.
    counters: CacheCounters,
    /// Per-key invalidation generations, indexed by key hash.
    generations: Box<[AtomicU64]>,
    /// Bumped on every group flush.
    flush_epoch: AtomicU64,
}

impl MetaCache {
    /// Creates a cache layer over a cache service.
    #[must_use]
    pub fn new(service: Arc<dyn CacheService>) -> Self {
        Self {
            service,
            counters: CacheCounters::default(),
            generations: (0 .. GENERATION_SLOTS).map(|_| AtomicU64::new(0)).collect(),
            flush_epoch: AtomicU64::new(0),
        }
    }

    /// Returns the cached mapping for one object without touching storage.
    #[must_use]
    pub fn peek(&self, target: &StorageTarget, id: ObjectId) -> Option<Arc<ObjectMeta>> {
        self.service.get(&CacheKey::new(target.cache_group.as_str(), id))
    }

    /// Returns the mapping for one object, hydrating it when not cached.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Storage`] when hydration fails.
    pub fn get_or_populate_one<E: SqlExecutor + ?Sized>(
        &self,
        executor: &E,
        target: &StorageTarget,
        id: ObjectId,
    ) -> Result<Arc<ObjectMeta>, MetaError> {
        let mut entries = self.get_or_populate(executor, target, &[id])?;
        Ok(entries.remove(&id).unwrap_or_default())
    }

    /// Returns mappings for every requested object, hydrating the uncached
    /// ones with a single bulk query.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Storage`] when the bulk query fails or returns
    /// malformed rows. Nothing is cached in that case.
    pub fn get_or_populate<E: SqlExecutor + ?Sized>(
        &self,
        executor: &E,
        target: &StorageTarget,
        ids: &[ObjectId],
    ) -> Result<BTreeMap<ObjectId, Arc<ObjectMeta>>, MetaError> {
        let mut resolved = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for id in ids {
            if resolved.contains_key(id) || missing.contains(id) {
                continue;
            }
            match self.peek(target, *id) {
                Some(entry) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    resolved.insert(*id, entry);
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    missing.insert(*id);
                }
            }
        }
        if missing.is_empty() {
            return Ok(resolved);
        }

        let epoch = self.flush_epoch.load(Ordering::SeqCst);
        let stamped: Vec<(CacheKey, u64)> = missing
            .iter()
            .map(|id| {
                let key = CacheKey::new(target.cache_group.as_str(), *id);
                let generation = self.generation_slot(&key).load(Ordering::SeqCst);
                (key, generation)
            })
            .collect();
        let mut hydrated = self.fetch_rows(executor, target, &missing)?;
        for (key, generation) in stamped {
            let entry = Arc::new(hydrated.remove(&key.id).unwrap_or_default());
            resolved.insert(key.id, Arc::clone(&entry));
            self.fill(key, entry, generation, epoch);
        }
        Ok(resolved)
    }

    /// Removes the cached mapping for one object.
    pub fn invalidate(&self, target: &StorageTarget, id: ObjectId) {
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        let key = CacheKey::new(target.cache_group.as_str(), id);
        self.generation_slot(&key).fetch_add(1, Ordering::SeqCst);
        let removed = self.service.delete(&key);
        debug!(object_type = %target.object_type, object_id = %id, removed, "meta cache invalidated");
    }

    /// Removes every cached mapping for a type.
    pub fn invalidate_group(&self, target: &StorageTarget) {
        self.counters.group_flushes.fetch_add(1, Ordering::Relaxed);
        self.flush_epoch.fetch_add(1, Ordering::SeqCst);
        let removed = self.service.flush_group(&target.cache_group);
        debug!(object_type = %target.object_type, removed, "meta cache group flushed");
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            hydration_queries: self.counters.hydration_queries.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            group_flushes: self.counters.group_flushes.load(Ordering::Relaxed),
            discarded_fills: self.counters.discarded_fills.load(Ordering::Relaxed),
        }
    }

    /// Returns the generation slot for a key.
    fn generation_slot(&self, key: &CacheKey) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = usize::try_from(hasher.finish() % GENERATION_SLOTS).unwrap_or_default();
        &self.generations[index]
    }

    /// Returns `true` when no invalidation touched `key` since the stamps
    /// were taken.
    fn is_current(&self, key: &CacheKey, generation: u64, epoch: u64) -> bool {
        self.generation_slot(key).load(Ordering::SeqCst) == generation
            && self.flush_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Caches a hydrated entry unless a write overlapped its query.
    fn fill(&self, key: CacheKey, entry: Arc<ObjectMeta>, generation: u64, epoch: u64) {
        if self.is_current(&key, generation, epoch) {
            self.service.add(key.clone(), entry);
            if self.is_current(&key, generation, epoch) {
                return;
            }
            self.service.delete(&key);
        }
        self.counters.discarded_fills.fetch_add(1, Ordering::Relaxed);
        debug!(cache_key = %key, "meta cache fill discarded after concurrent write");
    }

    /// Fetches all rows for the given ids in one query and groups them by id.
    fn fetch_rows<E: SqlExecutor + ?Sized>(
        &self,
        executor: &E,
        target: &StorageTarget,
        ids: &BTreeSet<ObjectId>,
    ) -> Result<BTreeMap<ObjectId, ObjectMeta>, MetaError> {
        // Ids are validated integers, so inlining them keeps this a single
        // statement regardless of the placeholder limit.
        let id_list = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT {column}, meta_key, meta_value FROM {table} WHERE {column} IN ({id_list})",
            column = target.id_column,
            table = target.table,
        );
        self.counters.hydration_queries.fetch_add(1, Ordering::Relaxed);
        let rows = executor.query(&sql, &[])?;
        debug!(
            object_type = %target.object_type,
            ids = ids.len(),
            rows = rows.len(),
            "meta cache hydrated"
        );

        let mut grouped: BTreeMap<ObjectId, ObjectMeta> = BTreeMap::new();
        for row in rows {
            let raw_id = row.integer(0)?;
            let id = ObjectId::from_signed(raw_id).ok_or_else(|| {
                SqlError::Decode(format!("stored object id out of range: {raw_id}"))
            })?;
            let key = row
                .text(1)?
                .ok_or_else(|| SqlError::Decode("stored meta_key is null".to_string()))?;
            let value = row.text(2)?.unwrap_or_else(|| "null".to_string());
            grouped.entry(id).or_default().insert(key, RawMetaValue::new(value));
        }
        Ok(grouped)
    }
}

impl std::fmt::Debug for MetaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaCache").field("stats", &self.stats()).finish_non_exhaustive()
    }
}
