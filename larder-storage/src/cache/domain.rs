//! Per-domain read cache.
//!
//! A [`DomainCache<T>`] is an id -> entity map plus an `initialized` flag.
//! The map is written only by [`DomainCache::initialize`] (once, at startup)
//! and [`DomainCache::refresh`] (driven by the change poller). Everything
//! else reads, and every read path falls back to the database when the map
//! cannot answer authoritatively.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use dashmap::DashMap;
use larder_core::{CacheError, EntityId, LarderError, LarderResult, TableName};

use super::traits::{CacheStats, CacheableEntity, EntitySource, LoadWindow, OwnedEntity};

/// What a refresh did to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// The row exists; its entry was inserted or overwritten.
    Upserted,
    /// The row is gone; its entry was removed.
    Removed,
    /// The row is gone and was not cached either.
    Absent,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
}

/// Read-through cache for one entity domain.
///
/// Readers never block writers: the map is a [`DashMap`], so a reader may
/// observe a value that is about to be overwritten. That is within the
/// eventual-consistency contract.
pub struct DomainCache<T: CacheableEntity> {
    entries: DashMap<EntityId, T>,
    initialized: AtomicBool,
    window: OnceLock<LoadWindow>,
    source: Arc<dyn EntitySource<T>>,
    counters: Counters,
}

impl<T: CacheableEntity> DomainCache<T> {
    /// Create an empty, uninitialized cache over the given source.
    pub fn new(source: Arc<dyn EntitySource<T>>) -> Self {
        Self {
            entries: DashMap::new(),
            initialized: AtomicBool::new(false),
            window: OnceLock::new(),
            source,
            counters: Counters::default(),
        }
    }

    /// The table this cache mirrors.
    pub fn table(&self) -> TableName {
        T::TABLE
    }

    /// Whether the bulk load has completed. Never reverts to `false`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The window the bulk load used, once initialized.
    pub fn load_window(&self) -> Option<LoadWindow> {
        self.window.get().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ========================================================================
    // LIFECYCLE (initializer + refresh handler)
    // ========================================================================

    /// Bulk load the table and mark the cache initialized.
    ///
    /// Failure is fatal for startup. Calling this again after success is a
    /// no-op that returns the current entry count.
    pub async fn initialize(&self, window: LoadWindow) -> LarderResult<usize> {
        if self.is_initialized() {
            tracing::warn!(table = %T::TABLE, "Cache already initialized, skipping bulk load");
            return Ok(self.len());
        }

        let started = Instant::now();
        let rows = self.source.load_initial(window).await.map_err(|e| {
            LarderError::from(CacheError::InitializationFailed {
                table: T::TABLE,
                reason: e.to_string(),
            })
        })?;

        for row in rows {
            self.entries.insert(row.entity_id(), row);
        }

        let _ = self.window.set(window);
        self.initialized.store(true, Ordering::Release);

        tracing::info!(
            table = %T::TABLE,
            entries = self.len(),
            window = ?window,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache initialized"
        );

        Ok(self.len())
    }

    /// Reconcile one id with its current database state.
    ///
    /// Reads the row without visibility filtering: present rows (including
    /// soft-deleted ones) are upserted, absent rows are removed. Idempotent.
    /// Errors are returned to the poller, which logs them and holds the cursor.
    pub async fn refresh(&self, id: EntityId) -> LarderResult<RefreshAction> {
        let row = self.source.fetch_unfiltered(id).await.map_err(|e| {
            LarderError::from(CacheError::RefreshFailed {
                table: T::TABLE,
                id,
                reason: e.to_string(),
            })
        })?;

        let action = match row {
            Some(row) => {
                self.entries.insert(id, row);
                RefreshAction::Upserted
            }
            None => match self.entries.remove(&id) {
                Some(_) => RefreshAction::Removed,
                None => RefreshAction::Absent,
            },
        };

        tracing::trace!(table = %T::TABLE, record_id = id, action = ?action, "Cache entry refreshed");
        Ok(action)
    }

    // ========================================================================
    // READ-THROUGH ACCESSORS
    // ========================================================================

    /// Get a visible entity by id.
    ///
    /// Served from the map when initialized and present. A cached
    /// soft-deleted row is reported as not found without a database read.
    /// Anything else falls back to a direct point read.
    pub async fn get(&self, id: EntityId) -> LarderResult<Option<T>> {
        if self.is_initialized() {
            if let Some(cached) = self.peek(id) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.is_visible().then_some(cached));
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        self.source.fetch(id).await
    }

    /// Get an entity by id, including soft-deleted rows.
    pub async fn get_including_deleted(&self, id: EntityId) -> LarderResult<Option<T>> {
        if self.is_initialized() {
            if let Some(cached) = self.peek(id) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(cached));
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        self.source.fetch_unfiltered(id).await
    }

    /// Get every visible entity among `ids`.
    ///
    /// Ids found in an initialized map are served from it; the rest go to
    /// the database in a single batched read. Unknown ids are omitted.
    /// Results follow the order of first appearance in `ids`.
    pub async fn get_many(&self, ids: &[EntityId]) -> LarderResult<Vec<T>> {
        let mut seen = HashSet::with_capacity(ids.len());
        let requested: Vec<EntityId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut found: HashMap<EntityId, T> = HashMap::with_capacity(requested.len());
        let mut missing = Vec::new();

        if self.is_initialized() {
            for &id in &requested {
                match self.peek(id) {
                    Some(cached) => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        if cached.is_visible() {
                            found.insert(id, cached);
                        }
                    }
                    None => {
                        self.counters.misses.fetch_add(1, Ordering::Relaxed);
                        missing.push(id);
                    }
                }
            }
        } else {
            missing.extend_from_slice(&requested);
        }

        if !missing.is_empty() {
            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
            for row in self.source.fetch_many(&missing).await? {
                found.insert(row.entity_id(), row);
            }
        }

        Ok(requested
            .into_iter()
            .filter_map(|id| found.remove(&id))
            .collect())
    }

    /// Run a secondary lookup.
    ///
    /// Answered entirely from the map when the cache is initialized and its
    /// load window covers the filter, otherwise entirely from the database.
    /// The two are never mixed. Results are ordered by id.
    pub async fn find(&self, filter: &T::Filter) -> LarderResult<Vec<T>> {
        if self.can_serve(filter) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            let mut rows: Vec<T> = self
                .entries
                .iter()
                .filter(|entry| entry.value().is_visible() && entry.value().matches(filter))
                .map(|entry| entry.value().clone())
                .collect();
            rows.sort_by_key(|row| row.entity_id());
            return Ok(rows);
        }

        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        let mut rows = self.source.fetch_matching(filter).await?;
        rows.sort_by_key(|row| row.entity_id());
        Ok(rows)
    }

    /// First match of a secondary lookup, by lowest id.
    pub async fn find_one(&self, filter: &T::Filter) -> LarderResult<Option<T>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Look at the map directly without falling back or counting.
    pub fn peek(&self, id: EntityId) -> Option<T> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }

    fn can_serve(&self, filter: &T::Filter) -> bool {
        if !self.is_initialized() {
            return false;
        }
        self.load_window()
            .map(|window| window.covers(T::filter_since(filter)))
            .unwrap_or(false)
    }
}

impl<T: OwnedEntity> DomainCache<T> {
    /// All visible rows owned by `owner_id`.
    pub async fn get_all_for_owner(&self, owner_id: EntityId) -> LarderResult<Vec<T>> {
        self.find(&T::owner_filter(owner_id)).await
    }
}

impl<T: CacheableEntity> std::fmt::Debug for DomainCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainCache")
            .field("table", &T::TABLE)
            .field("initialized", &self.is_initialized())
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTable;
    use larder_core::{Product, ProductFilter, StorageLocation, StorageLocationFilter};
    use larder_test_utils::fixtures;

    fn product_cache(table: &Arc<InMemoryTable<Product>>) -> DomainCache<Product> {
        DomainCache::new(table.clone())
    }

    #[tokio::test]
    async fn test_initialize_loads_all_rows() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(1, 10)).await;
        table.put(fixtures::product(2, 10)).await;

        let cache = product_cache(&table);
        assert!(!cache.is_initialized());

        let loaded = cache.initialize(LoadWindow::All).await.expect("initialize should succeed");
        assert_eq!(loaded, 2);
        assert!(cache.is_initialized());
        assert_eq!(cache.load_window(), Some(LoadWindow::All));
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_cache_uninitialized() {
        let table = Arc::new(InMemoryTable::<Product>::new());
        table.fail_bulk_load(true);

        let cache = product_cache(&table);
        let err = cache.initialize(LoadWindow::All).await.unwrap_err();
        assert!(matches!(
            err,
            LarderError::Cache(CacheError::InitializationFailed {
                table: TableName::Products,
                ..
            })
        ));
        assert!(!cache.is_initialized());
    }

    #[tokio::test]
    async fn test_second_initialize_is_noop() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(1, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        table.put(fixtures::product(2, 10)).await;
        let loaded = cache.initialize(LoadWindow::All).await.expect("initialize should succeed");
        assert_eq!(loaded, 1);
        assert_eq!(table.bulk_loads(), 1);
    }

    #[tokio::test]
    async fn test_get_hits_map_when_initialized() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(5, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        let product = cache.get(5).await.expect("get should succeed");
        assert_eq!(product.map(|p| p.id), Some(5));
        assert_eq!(table.point_reads(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_get_miss_falls_back_without_populating() {
        let table = Arc::new(InMemoryTable::new());
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        // Row written after the bulk load, change not yet polled
        table.put(fixtures::product(8, 10)).await;

        let product = cache.get(8).await.expect("get should succeed");
        assert_eq!(product.map(|p| p.id), Some(8));
        assert_eq!(table.point_reads(), 1);
        assert!(cache.peek(8).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_entry_is_not_found() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(3, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        table.soft_delete(3).await;
        assert_eq!(
            cache.refresh(3).await.expect("refresh should succeed"),
            RefreshAction::Upserted
        );

        // Still tracked, but invisible to normal reads and no DB round trip
        assert!(cache.peek(3).is_some_and(|p| p.is_deleted()));
        assert!(cache.get(3).await.expect("get should succeed").is_none());
        assert_eq!(table.point_reads(), 0);

        let raw = cache
            .get_including_deleted(3)
            .await
            .expect("get_including_deleted should succeed");
        assert!(raw.is_some());
    }

    #[tokio::test]
    async fn test_refresh_removes_hard_deleted_row() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(4, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        table.remove(4).await;
        assert_eq!(
            cache.refresh(4).await.expect("refresh should succeed"),
            RefreshAction::Removed
        );
        assert_eq!(
            cache.refresh(4).await.expect("refresh should succeed"),
            RefreshAction::Absent
        );
        assert!(cache.is_initialized());
        assert!(cache.get(4).await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_refresh_error_keeps_entry() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(6, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        table.fail_refresh_for(6).await;
        let err = cache.refresh(6).await.unwrap_err();
        assert!(matches!(
            err,
            LarderError::Cache(CacheError::RefreshFailed { id: 6, .. })
        ));
        assert!(cache.peek(6).is_some());
    }

    #[tokio::test]
    async fn test_get_many_partitions_cached_and_missing() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::product(1, 10)).await;
        table.put(fixtures::product(2, 10)).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        table.put(fixtures::product(3, 10)).await;

        let rows = cache
            .get_many(&[3, 1, 99, 1, 2])
            .await
            .expect("get_many should succeed");
        let ids: Vec<EntityId> = rows.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(table.batch_reads(), 1);
        assert_eq!(table.last_batch().await, vec![3, 99]);
    }

    #[tokio::test]
    async fn test_get_many_empty_issues_no_query() {
        let table = Arc::new(InMemoryTable::<Product>::new());
        let cache = product_cache(&table);

        let rows = cache.get_many(&[]).await.expect("get_many should succeed");
        assert!(rows.is_empty());
        assert_eq!(table.batch_reads(), 0);
    }

    #[tokio::test]
    async fn test_find_scans_map_or_queries_never_both() {
        let table = Arc::new(InMemoryTable::new());
        table.put(fixtures::storage_location(1, 10)).await;
        table.put(fixtures::storage_location(2, 11)).await;
        let cache: DomainCache<StorageLocation> = DomainCache::new(table.clone());

        // Uninitialized: database
        let rows = cache
            .find(&StorageLocationFilter::ByFamily(10))
            .await
            .expect("find should succeed");
        assert_eq!(rows.len(), 1);
        assert_eq!(table.filtered_reads(), 1);

        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        // Initialized: map only, even though the table has gained a row
        table.put(fixtures::storage_location(3, 10)).await;
        let rows = cache
            .get_all_for_owner(10)
            .await
            .expect("get_all_for_owner should succeed");
        assert_eq!(rows.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(table.filtered_reads(), 1);
    }

    #[tokio::test]
    async fn test_find_one_by_barcode() {
        let table = Arc::new(InMemoryTable::new());
        let mut product = fixtures::product(1, 10);
        product.barcode = Some("4006381333931".to_string());
        table.put(product).await;
        let cache = product_cache(&table);
        cache.initialize(LoadWindow::All).await.expect("initialize should succeed");

        let hit = cache
            .find_one(&ProductFilter::ByBarcode {
                family_id: 10,
                barcode: "4006381333931".to_string(),
            })
            .await
            .expect("find_one should succeed");
        assert_eq!(hit.map(|p| p.id), Some(1));
    }
}
