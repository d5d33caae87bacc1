//! Cacheable entity marker and persistence boundary.
//!
//! [`CacheableEntity`] describes how a domain type is keyed, which table it
//! lives in and how its secondary lookups are evaluated in memory.
//! [`EntitySource`] is the narrow query capability the cache consumes from
//! the persistence layer.

use async_trait::async_trait;
use larder_core::{
    Activity, ActivityFilter, EntityId, Family, FamilyFilter, LarderResult, Product,
    ProductFilter, ProductLineItem, ProductLineItemFilter, ShoppingListItem,
    ShoppingListItemFilter, ShoppingLocation, ShoppingLocationFilter, StorageLocation,
    StorageLocationFilter, TableName, Timestamp, User, UserFilter,
};
use std::fmt::Debug;

/// Marker trait for types that can live in a [`DomainCache`](super::DomainCache).
///
/// # Implementation Requirements
///
/// - `TABLE` must be the name the change log uses for this domain
/// - `entity_id()` must return the row's primary key
/// - `matches()` must agree with the WHERE clause the database source
///   builds for the same filter, or cached and uncached lookups diverge
pub trait CacheableEntity: Clone + Debug + Send + Sync + 'static {
    /// Secondary lookup filter for this domain.
    type Filter: Debug + Send + Sync;

    /// Change-log table name for this domain.
    const TABLE: TableName;

    /// Get the primary key of this row.
    fn entity_id(&self) -> EntityId;

    /// When the row was created. Used to apply bounded load windows.
    fn created_at(&self) -> Timestamp;

    /// Whether normal queries can see this row.
    ///
    /// Soft-deleted rows return `false`. They stay in the cache map so that
    /// their deletion state is mirrored, but read-through accessors report
    /// them as not found.
    fn is_visible(&self) -> bool {
        true
    }

    /// Evaluate a secondary lookup filter against this row.
    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Lower time bound of a filter, if it has one.
    ///
    /// A cache loaded with [`LoadWindow::Since`] only serves filters whose
    /// bound lies inside the loaded window.
    fn filter_since(_filter: &Self::Filter) -> Option<Timestamp> {
        None
    }
}

/// Entities owned by a family, exposing an "all rows for this owner" lookup.
pub trait OwnedEntity: CacheableEntity {
    /// The filter selecting every row owned by `owner_id`.
    fn owner_filter(owner_id: EntityId) -> Self::Filter;
}

/// Which rows a bulk load should bring into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWindow {
    /// Every row of the table.
    All,
    /// Only rows created at or after the given instant.
    Since(Timestamp),
}

impl LoadWindow {
    /// Whether this window contains a row created at `created_at`.
    pub fn contains(&self, created_at: Timestamp) -> bool {
        match self {
            LoadWindow::All => true,
            LoadWindow::Since(start) => created_at >= *start,
        }
    }

    /// Whether a lookup bounded below by `since` is fully inside this window.
    pub fn covers(&self, since: Option<Timestamp>) -> bool {
        match (self, since) {
            (LoadWindow::All, _) => true,
            (LoadWindow::Since(start), Some(since)) => since >= *start,
            (LoadWindow::Since(_), None) => false,
        }
    }
}

/// Query capability the cache consumes from the persistence layer.
///
/// Every method is a direct database read. Visibility filtering (hiding
/// soft-deleted rows) applies to everything except `load_initial` and
/// `fetch_unfiltered`, which must see the physical state of the table.
#[async_trait]
pub trait EntitySource<T: CacheableEntity>: Send + Sync {
    /// Bulk load for cache initialization, including soft-deleted rows.
    async fn load_initial(&self, window: LoadWindow) -> LarderResult<Vec<T>>;

    /// Point read with normal visibility filtering.
    async fn fetch(&self, id: EntityId) -> LarderResult<Option<T>>;

    /// Point read ignoring visibility filtering. Used by refresh handlers.
    async fn fetch_unfiltered(&self, id: EntityId) -> LarderResult<Option<T>>;

    /// One batched read for a set of ids. Unknown ids are omitted.
    async fn fetch_many(&self, ids: &[EntityId]) -> LarderResult<Vec<T>>;

    /// Filtered read for a secondary lookup.
    async fn fetch_matching(&self, filter: &T::Filter) -> LarderResult<Vec<T>>;
}

/// Statistics about one domain cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the map.
    pub hits: u64,
    /// Lookups for ids absent from an initialized map.
    pub misses: u64,
    /// Database round trips taken by read-through accessors.
    pub fallbacks: u64,
    /// Number of entries currently in the map.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS FOR LARDER ENTITIES
// ============================================================================

impl CacheableEntity for User {
    type Filter = UserFilter;
    const TABLE: TableName = TableName::Users;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn matches(&self, filter: &UserFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for User {
    fn owner_filter(owner_id: EntityId) -> UserFilter {
        UserFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for Family {
    type Filter = FamilyFilter;
    const TABLE: TableName = TableName::Families;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn matches(&self, filter: &FamilyFilter) -> bool {
        filter.matches(self)
    }
}

impl CacheableEntity for Product {
    type Filter = ProductFilter;
    const TABLE: TableName = TableName::Products;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn is_visible(&self) -> bool {
        !self.is_deleted()
    }

    fn matches(&self, filter: &ProductFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for Product {
    fn owner_filter(owner_id: EntityId) -> ProductFilter {
        ProductFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for ProductLineItem {
    type Filter = ProductLineItemFilter;
    const TABLE: TableName = TableName::ProductLineItems;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn matches(&self, filter: &ProductLineItemFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for ProductLineItem {
    fn owner_filter(owner_id: EntityId) -> ProductLineItemFilter {
        ProductLineItemFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for StorageLocation {
    type Filter = StorageLocationFilter;
    const TABLE: TableName = TableName::StorageLocations;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn is_visible(&self) -> bool {
        !self.is_deleted()
    }

    fn matches(&self, filter: &StorageLocationFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for StorageLocation {
    fn owner_filter(owner_id: EntityId) -> StorageLocationFilter {
        StorageLocationFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for ShoppingLocation {
    type Filter = ShoppingLocationFilter;
    const TABLE: TableName = TableName::ShoppingLocations;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn is_visible(&self) -> bool {
        !self.is_deleted()
    }

    fn matches(&self, filter: &ShoppingLocationFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for ShoppingLocation {
    fn owner_filter(owner_id: EntityId) -> ShoppingLocationFilter {
        ShoppingLocationFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for ShoppingListItem {
    type Filter = ShoppingListItemFilter;
    const TABLE: TableName = TableName::ShoppingListItems;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn matches(&self, filter: &ShoppingListItemFilter) -> bool {
        filter.matches(self)
    }
}

impl OwnedEntity for ShoppingListItem {
    fn owner_filter(owner_id: EntityId) -> ShoppingListItemFilter {
        ShoppingListItemFilter::ByFamily(owner_id)
    }
}

impl CacheableEntity for Activity {
    type Filter = ActivityFilter;
    const TABLE: TableName = TableName::Activities;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn matches(&self, filter: &ActivityFilter) -> bool {
        filter.matches(self)
    }

    fn filter_since(filter: &ActivityFilter) -> Option<Timestamp> {
        Some(filter.since())
    }
}
