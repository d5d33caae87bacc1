//! The set of domain caches and the change-log dispatch table.
//!
//! [`DomainCaches`] owns one [`DomainCache`] per tracked table. The dispatch
//! from a [`TableName`] to its refresh handler is an exhaustive `match`, so a
//! new table variant without a cache is a compile error. Adding a cached
//! domain means one field here, one arm in each match, and nothing in the
//! poller.

use std::sync::Arc;

use larder_core::{
    Activity, ActivityFilter, EntityId, Family, FamilyFilter, LarderResult, Product,
    ProductFilter, ProductLineItem, ShoppingListItem, ShoppingLocation, StorageLocation,
    TableName, Timestamp, User, UserFilter,
};

use super::config::CacheConfig;
use super::domain::{DomainCache, RefreshAction};
use super::traits::{CacheStats, EntitySource, LoadWindow};

/// Database sources for every cached domain.
#[derive(Clone)]
pub struct CacheSources {
    pub users: Arc<dyn EntitySource<User>>,
    pub families: Arc<dyn EntitySource<Family>>,
    pub products: Arc<dyn EntitySource<Product>>,
    pub product_line_items: Arc<dyn EntitySource<ProductLineItem>>,
    pub storage_locations: Arc<dyn EntitySource<StorageLocation>>,
    pub shopping_locations: Arc<dyn EntitySource<ShoppingLocation>>,
    pub shopping_list_items: Arc<dyn EntitySource<ShoppingListItem>>,
    pub activities: Arc<dyn EntitySource<Activity>>,
}

/// All process-wide domain caches.
///
/// Constructed once at startup and shared by `Arc` with the coordinator and
/// with every reader.
#[derive(Debug)]
pub struct DomainCaches {
    users: DomainCache<User>,
    families: DomainCache<Family>,
    products: DomainCache<Product>,
    product_line_items: DomainCache<ProductLineItem>,
    storage_locations: DomainCache<StorageLocation>,
    shopping_locations: DomainCache<ShoppingLocation>,
    shopping_list_items: DomainCache<ShoppingListItem>,
    activities: DomainCache<Activity>,
}

impl DomainCaches {
    /// Create empty, uninitialized caches over the given sources.
    pub fn new(sources: CacheSources) -> Self {
        Self {
            users: DomainCache::new(sources.users),
            families: DomainCache::new(sources.families),
            products: DomainCache::new(sources.products),
            product_line_items: DomainCache::new(sources.product_line_items),
            storage_locations: DomainCache::new(sources.storage_locations),
            shopping_locations: DomainCache::new(sources.shopping_locations),
            shopping_list_items: DomainCache::new(sources.shopping_list_items),
            activities: DomainCache::new(sources.activities),
        }
    }

    pub fn users(&self) -> &DomainCache<User> {
        &self.users
    }

    pub fn families(&self) -> &DomainCache<Family> {
        &self.families
    }

    pub fn products(&self) -> &DomainCache<Product> {
        &self.products
    }

    pub fn product_line_items(&self) -> &DomainCache<ProductLineItem> {
        &self.product_line_items
    }

    pub fn storage_locations(&self) -> &DomainCache<StorageLocation> {
        &self.storage_locations
    }

    pub fn shopping_locations(&self) -> &DomainCache<ShoppingLocation> {
        &self.shopping_locations
    }

    pub fn shopping_list_items(&self) -> &DomainCache<ShoppingListItem> {
        &self.shopping_list_items
    }

    pub fn activities(&self) -> &DomainCache<Activity> {
        &self.activities
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Bulk load every domain, in [`TableName::ALL`] order.
    ///
    /// Stops at the first failure. The error is fatal for startup.
    pub async fn initialize_all(&self, config: &CacheConfig) -> LarderResult<()> {
        for table in TableName::ALL {
            let window = match table {
                TableName::Activities => config.activity_load_window(),
                _ => LoadWindow::All,
            };
            self.initialize(table, window).await?;
        }
        Ok(())
    }

    /// Bulk load one domain.
    pub async fn initialize(&self, table: TableName, window: LoadWindow) -> LarderResult<usize> {
        match table {
            TableName::Users => self.users.initialize(window).await,
            TableName::Families => self.families.initialize(window).await,
            TableName::Products => self.products.initialize(window).await,
            TableName::ProductLineItems => self.product_line_items.initialize(window).await,
            TableName::StorageLocations => self.storage_locations.initialize(window).await,
            TableName::ShoppingLocations => self.shopping_locations.initialize(window).await,
            TableName::ShoppingListItems => self.shopping_list_items.initialize(window).await,
            TableName::Activities => self.activities.initialize(window).await,
        }
    }

    /// Route one change-log row to its domain's refresh handler.
    pub async fn refresh(&self, table: TableName, id: EntityId) -> LarderResult<RefreshAction> {
        match table {
            TableName::Users => self.users.refresh(id).await,
            TableName::Families => self.families.refresh(id).await,
            TableName::Products => self.products.refresh(id).await,
            TableName::ProductLineItems => self.product_line_items.refresh(id).await,
            TableName::StorageLocations => self.storage_locations.refresh(id).await,
            TableName::ShoppingLocations => self.shopping_locations.refresh(id).await,
            TableName::ShoppingListItems => self.shopping_list_items.refresh(id).await,
            TableName::Activities => self.activities.refresh(id).await,
        }
    }

    /// Whether a domain has finished its bulk load.
    pub fn is_initialized(&self, table: TableName) -> bool {
        match table {
            TableName::Users => self.users.is_initialized(),
            TableName::Families => self.families.is_initialized(),
            TableName::Products => self.products.is_initialized(),
            TableName::ProductLineItems => self.product_line_items.is_initialized(),
            TableName::StorageLocations => self.storage_locations.is_initialized(),
            TableName::ShoppingLocations => self.shopping_locations.is_initialized(),
            TableName::ShoppingListItems => self.shopping_list_items.is_initialized(),
            TableName::Activities => self.activities.is_initialized(),
        }
    }

    /// Whether every domain has finished its bulk load.
    pub fn all_initialized(&self) -> bool {
        TableName::ALL.into_iter().all(|t| self.is_initialized(t))
    }

    /// Statistics for one domain.
    pub fn stats(&self, table: TableName) -> CacheStats {
        match table {
            TableName::Users => self.users.stats(),
            TableName::Families => self.families.stats(),
            TableName::Products => self.products.stats(),
            TableName::ProductLineItems => self.product_line_items.stats(),
            TableName::StorageLocations => self.storage_locations.stats(),
            TableName::ShoppingLocations => self.shopping_locations.stats(),
            TableName::ShoppingListItems => self.shopping_list_items.stats(),
            TableName::Activities => self.activities.stats(),
        }
    }

    // ========================================================================
    // DOMAIN-SPECIFIC LOOKUPS
    // ========================================================================

    /// Find the family a share code belongs to.
    pub async fn family_by_share_code(&self, share_code: &str) -> LarderResult<Option<Family>> {
        self.families
            .find_one(&FamilyFilter::ByShareCode(share_code.to_string()))
            .await
    }

    /// Find a user by email, ignoring case.
    pub async fn user_by_email(&self, email: &str) -> LarderResult<Option<User>> {
        self.users
            .find_one(&UserFilter::ByEmail(email.to_string()))
            .await
    }

    /// Find a family's product by barcode.
    pub async fn product_by_barcode(
        &self,
        family_id: EntityId,
        barcode: &str,
    ) -> LarderResult<Option<Product>> {
        self.products
            .find_one(&ProductFilter::ByBarcode {
                family_id,
                barcode: barcode.to_string(),
            })
            .await
    }

    /// A family's activity feed over the loaded window, newest first.
    ///
    /// Before initialization this reads the same window from the database.
    pub async fn recent_activities(
        &self,
        family_id: EntityId,
        config: &CacheConfig,
    ) -> LarderResult<Vec<Activity>> {
        let since = match self.activities.load_window() {
            Some(LoadWindow::Since(start)) => start,
            Some(LoadWindow::All) => Timestamp::UNIX_EPOCH,
            None => match config.activity_load_window() {
                LoadWindow::Since(start) => start,
                LoadWindow::All => Timestamp::UNIX_EPOCH,
            },
        };
        let mut feed = self
            .activities
            .find(&ActivityFilter::ByFamily { family_id, since })
            .await?;
        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(feed)
    }
}
