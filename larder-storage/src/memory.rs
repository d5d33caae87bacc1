//! In-memory persistence for tests and local development.
//!
//! [`InMemoryTable`] implements [`EntitySource`] over a `BTreeMap` and counts
//! every read so tests can assert which path a lookup took. It can be told to
//! fail bulk loads or refresh reads for specific ids. [`InMemoryStore`] groups
//! one table per domain with a shared [`InMemoryChangeLog`] and writes to both,
//! the way application write paths do.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use larder_core::{
    Activity, EntityId, Family, LarderResult, Product, ProductLineItem, ShoppingListItem,
    ShoppingLocation, StorageError, StorageLocation, Timestamp, User,
};
use tokio::sync::RwLock;

use crate::cache::{CacheSources, CacheableEntity, EntitySource, InMemoryChangeLog, LoadWindow};

/// Rows that support soft deletion.
pub trait SoftDelete {
    /// Stamp the row as deleted at `at`.
    fn mark_deleted(&mut self, at: Timestamp);
}

impl SoftDelete for Product {
    fn mark_deleted(&mut self, at: Timestamp) {
        self.deleted_at = Some(at);
    }
}

impl SoftDelete for StorageLocation {
    fn mark_deleted(&mut self, at: Timestamp) {
        self.deleted_at = Some(at);
    }
}

impl SoftDelete for ShoppingLocation {
    fn mark_deleted(&mut self, at: Timestamp) {
        self.deleted_at = Some(at);
    }
}

#[derive(Debug, Default)]
struct ReadCounters {
    bulk_loads: AtomicU64,
    point_reads: AtomicU64,
    unfiltered_reads: AtomicU64,
    batch_reads: AtomicU64,
    filtered_reads: AtomicU64,
}

/// One in-memory table.
#[derive(Debug)]
pub struct InMemoryTable<T: CacheableEntity> {
    rows: RwLock<BTreeMap<EntityId, T>>,
    failing_ids: RwLock<HashSet<EntityId>>,
    fail_bulk: AtomicBool,
    counters: ReadCounters,
    unfiltered_by_id: RwLock<HashMap<EntityId, u64>>,
    last_batch: RwLock<Vec<EntityId>>,
}

impl<T: CacheableEntity> Default for InMemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            failing_ids: RwLock::new(HashSet::new()),
            fail_bulk: AtomicBool::new(false),
            counters: ReadCounters::default(),
            unfiltered_by_id: RwLock::new(HashMap::new()),
            last_batch: RwLock::new(Vec::new()),
        }
    }
}

impl<T: CacheableEntity> InMemoryTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row.
    pub async fn put(&self, row: T) {
        self.rows.write().await.insert(row.entity_id(), row);
    }

    /// Physically delete a row. Returns whether it existed.
    pub async fn remove(&self, id: EntityId) -> bool {
        self.rows.write().await.remove(&id).is_some()
    }

    /// Current stored state of a row, bypassing counters.
    pub async fn row(&self, id: EntityId) -> Option<T> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Make the next bulk loads fail (or succeed again).
    pub fn fail_bulk_load(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    /// Make every refresh read of `id` fail until cleared.
    pub async fn fail_refresh_for(&self, id: EntityId) {
        self.failing_ids.write().await.insert(id);
    }

    pub async fn clear_refresh_failure(&self, id: EntityId) {
        self.failing_ids.write().await.remove(&id);
    }

    pub fn bulk_loads(&self) -> u64 {
        self.counters.bulk_loads.load(Ordering::SeqCst)
    }

    pub fn point_reads(&self) -> u64 {
        self.counters.point_reads.load(Ordering::SeqCst)
    }

    pub fn unfiltered_reads(&self) -> u64 {
        self.counters.unfiltered_reads.load(Ordering::SeqCst)
    }

    /// Refresh reads attempted for one id, failed ones included.
    pub async fn refresh_reads(&self, id: EntityId) -> u64 {
        self.unfiltered_by_id.read().await.get(&id).copied().unwrap_or(0)
    }

    pub fn batch_reads(&self) -> u64 {
        self.counters.batch_reads.load(Ordering::SeqCst)
    }

    pub fn filtered_reads(&self) -> u64 {
        self.counters.filtered_reads.load(Ordering::SeqCst)
    }

    /// Ids requested by the most recent batched read.
    pub async fn last_batch(&self) -> Vec<EntityId> {
        self.last_batch.read().await.clone()
    }
}

impl<T: CacheableEntity + SoftDelete> InMemoryTable<T> {
    /// Soft-delete a row in place. Returns whether it existed.
    pub async fn soft_delete(&self, id: EntityId) -> bool {
        match self.rows.write().await.get_mut(&id) {
            Some(row) => {
                row.mark_deleted(Utc::now());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl<T: CacheableEntity> EntitySource<T> for InMemoryTable<T> {
    async fn load_initial(&self, window: LoadWindow) -> LarderResult<Vec<T>> {
        self.counters.bulk_loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(StorageError::Query {
                table: T::TABLE.to_string(),
                reason: "injected bulk load failure".to_string(),
            }
            .into());
        }
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| window.contains(row.created_at()))
            .cloned()
            .collect())
    }

    async fn fetch(&self, id: EntityId) -> LarderResult<Option<T>> {
        self.counters.point_reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().await;
        Ok(rows.get(&id).filter(|row| row.is_visible()).cloned())
    }

    async fn fetch_unfiltered(&self, id: EntityId) -> LarderResult<Option<T>> {
        self.counters.unfiltered_reads.fetch_add(1, Ordering::SeqCst);
        *self.unfiltered_by_id.write().await.entry(id).or_insert(0) += 1;
        if self.failing_ids.read().await.contains(&id) {
            return Err(StorageError::Query {
                table: T::TABLE.to_string(),
                reason: format!("injected failure reading row {id}"),
            }
            .into());
        }
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn fetch_many(&self, ids: &[EntityId]) -> LarderResult<Vec<T>> {
        self.counters.batch_reads.fetch_add(1, Ordering::SeqCst);
        *self.last_batch.write().await = ids.to_vec();
        let rows = self.rows.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|row| row.is_visible())
            .cloned()
            .collect())
    }

    async fn fetch_matching(&self, filter: &T::Filter) -> LarderResult<Vec<T>> {
        self.counters.filtered_reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.is_visible() && row.matches(filter))
            .cloned()
            .collect())
    }
}

/// One in-memory table per cached domain plus the shared change log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pub users: Arc<InMemoryTable<User>>,
    pub families: Arc<InMemoryTable<Family>>,
    pub products: Arc<InMemoryTable<Product>>,
    pub product_line_items: Arc<InMemoryTable<ProductLineItem>>,
    pub storage_locations: Arc<InMemoryTable<StorageLocation>>,
    pub shopping_locations: Arc<InMemoryTable<ShoppingLocation>>,
    pub shopping_list_items: Arc<InMemoryTable<ShoppingListItem>>,
    pub activities: Arc<InMemoryTable<Activity>>,
    pub change_log: Arc<InMemoryChangeLog>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources for [`DomainCaches::new`](crate::cache::DomainCaches::new).
    pub fn sources(&self) -> CacheSources {
        CacheSources {
            users: self.users.clone(),
            families: self.families.clone(),
            products: self.products.clone(),
            product_line_items: self.product_line_items.clone(),
            storage_locations: self.storage_locations.clone(),
            shopping_locations: self.shopping_locations.clone(),
            shopping_list_items: self.shopping_list_items.clone(),
            activities: self.activities.clone(),
        }
    }

    /// Write a row and record the change. Returns the change-log id.
    pub async fn write<T: CacheableEntity>(&self, table: &InMemoryTable<T>, row: T) -> i64 {
        let id = row.entity_id();
        table.put(row).await;
        self.change_log.append(T::TABLE, id).await
    }

    /// Physically delete a row and record the change.
    pub async fn delete<T: CacheableEntity>(&self, table: &InMemoryTable<T>, id: EntityId) -> i64 {
        table.remove(id).await;
        self.change_log.append(T::TABLE, id).await
    }

    /// Soft-delete a row and record the change.
    pub async fn soft_delete<T: CacheableEntity + SoftDelete>(
        &self,
        table: &InMemoryTable<T>,
        id: EntityId,
    ) -> i64 {
        table.soft_delete(id).await;
        self.change_log.append(T::TABLE, id).await
    }
}
