//! Core entity structures
//!
//! One struct per cached domain, mirroring the row shape of its table.
//! Soft-deletable domains carry `deleted_at`; a row with `deleted_at` set is
//! invisible to normal queries but is still tracked by the cache.

use crate::{EntityId, TableName, Timestamp};
use serde::{Deserialize, Serialize};

/// A registered person. Belongs to at most one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub family_id: Option<EntityId>,
    pub email: String,
    pub display_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A household sharing one inventory. Members join with `share_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: EntityId,
    pub name: String,
    pub share_code: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A product definition owned by a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub family_id: EntityId,
    pub name: String,
    pub barcode: Option<String>,
    pub image_id: Option<EntityId>,
    pub default_storage_location_id: Option<EntityId>,
    /// Restock threshold used when generating shopping list suggestions.
    pub minimum_quantity: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// A concrete quantity of a product on hand, optionally with an expiry date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLineItem {
    pub id: EntityId,
    pub product_id: EntityId,
    pub family_id: EntityId,
    pub storage_location_id: Option<EntityId>,
    pub quantity: i32,
    pub expires_on: Option<chrono::NaiveDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Where things are kept at home (fridge, pantry shelf, freezer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub id: EntityId,
    pub family_id: EntityId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// Where things are bought (a shop, a market stall).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingLocation {
    pub id: EntityId,
    pub family_id: EntityId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// One line of a family's shopping list. Either free text or tied to a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: EntityId,
    pub family_id: EntityId,
    pub product_id: Option<EntityId>,
    pub shopping_location_id: Option<EntityId>,
    pub title: String,
    pub quantity: i32,
    pub checked: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Append-only record of something that happened in a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: EntityId,
    pub family_id: EntityId,
    pub user_id: Option<EntityId>,
    /// Free-form event kind, e.g. `product_added` or `item_checked`.
    pub kind: String,
    /// Table of the row the activity is about, as stored. May name tables
    /// outside the cached set.
    pub subject_table: Option<String>,
    pub subject_id: Option<EntityId>,
    pub details: serde_json::Value,
    pub created_at: Timestamp,
}

impl Product {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl StorageLocation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl ShoppingLocation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Activity {
    /// The subject table, if it is one of the tracked tables.
    pub fn subject(&self) -> Option<TableName> {
        self.subject_table.as_deref().and_then(TableName::parse)
    }
}
