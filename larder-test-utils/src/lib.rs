//! Larder Test Utilities
//!
//! Shared test infrastructure for the Larder workspace:
//! - Proptest generators for every cached entity type
//! - Change workloads for cache convergence properties
//! - Fixtures with fixed, predictable field values

pub use larder_core::{
    Activity, EntityId, Family, Product, ProductLineItem, ShoppingListItem, ShoppingLocation,
    StorageLocation, TableName, Timestamp, User,
};

use chrono::{TimeZone, Utc};

/// Fixed instant used by fixtures that don't care about time.
pub fn fixed_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Larder entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Generators ===

    /// Generate a positive row id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1i64..1_000_000
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a TableName variant.
    pub fn arb_table_name() -> impl Strategy<Value = TableName> {
        proptest::sample::select(TableName::ALL.to_vec())
    }

    /// Generate a six-character share code.
    pub fn arb_share_code() -> impl Strategy<Value = String> {
        "[A-Z0-9]{6}".prop_map(|s| s)
    }

    // === Struct Generators ===

    pub fn arb_user() -> impl Strategy<Value = User> {
        (
            arb_entity_id(),
            prop::option::of(arb_entity_id()),
            "[a-z]{3,10}@[a-z]{3,8}\\.(com|org)",
            "[A-Z][a-z]{2,12}",
            arb_timestamp(),
        )
            .prop_map(|(id, family_id, email, display_name, created_at)| User {
                id,
                family_id,
                email,
                display_name,
                created_at,
                updated_at: created_at,
            })
    }

    pub fn arb_family() -> impl Strategy<Value = Family> {
        (
            arb_entity_id(),
            "[A-Z][a-z]{2,12}",
            arb_share_code(),
            arb_timestamp(),
        )
            .prop_map(|(id, name, share_code, created_at)| Family {
                id,
                name,
                share_code,
                created_at,
                updated_at: created_at,
            })
    }

    pub fn arb_product() -> impl Strategy<Value = Product> {
        (
            arb_entity_id(),
            arb_entity_id(),
            "[a-z ]{3,20}",
            prop::option::of("[0-9]{13}"),
            0i32..10,
            arb_timestamp(),
            any::<bool>(),
        )
            .prop_map(
                |(id, family_id, name, barcode, minimum_quantity, created_at, deleted)| Product {
                    id,
                    family_id,
                    name,
                    barcode,
                    image_id: None,
                    default_storage_location_id: None,
                    minimum_quantity,
                    created_at,
                    updated_at: created_at,
                    deleted_at: deleted.then_some(created_at),
                },
            )
    }

    pub fn arb_product_line_item() -> impl Strategy<Value = ProductLineItem> {
        (
            arb_entity_id(),
            arb_entity_id(),
            arb_entity_id(),
            prop::option::of(arb_entity_id()),
            1i32..50,
            arb_timestamp(),
        )
            .prop_map(
                |(id, product_id, family_id, storage_location_id, quantity, created_at)| {
                    ProductLineItem {
                        id,
                        product_id,
                        family_id,
                        storage_location_id,
                        quantity,
                        expires_on: Some(created_at.date_naive()),
                        created_at,
                        updated_at: created_at,
                    }
                },
            )
    }

    pub fn arb_storage_location() -> impl Strategy<Value = StorageLocation> {
        (
            arb_entity_id(),
            arb_entity_id(),
            "[A-Z][a-z]{2,12}",
            arb_timestamp(),
        )
            .prop_map(|(id, family_id, name, created_at)| StorageLocation {
                id,
                family_id,
                name,
                created_at,
                updated_at: created_at,
                deleted_at: None,
            })
    }

    pub fn arb_shopping_location() -> impl Strategy<Value = ShoppingLocation> {
        (
            arb_entity_id(),
            arb_entity_id(),
            "[A-Z][a-z]{2,12}",
            arb_timestamp(),
            any::<bool>(),
        )
            .prop_map(|(id, family_id, name, created_at, deleted)| ShoppingLocation {
                id,
                family_id,
                name,
                created_at,
                updated_at: created_at,
                deleted_at: deleted.then_some(created_at),
            })
    }

    pub fn arb_shopping_list_item() -> impl Strategy<Value = ShoppingListItem> {
        (
            arb_entity_id(),
            arb_entity_id(),
            prop::option::of(arb_entity_id()),
            "[a-z ]{3,20}",
            1i32..20,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                |(id, family_id, product_id, title, quantity, checked, created_at)| {
                    ShoppingListItem {
                        id,
                        family_id,
                        product_id,
                        shopping_location_id: None,
                        title,
                        quantity,
                        checked,
                        created_at,
                        updated_at: created_at,
                    }
                },
            )
    }

    pub fn arb_activity() -> impl Strategy<Value = Activity> {
        (
            arb_entity_id(),
            arb_entity_id(),
            prop::option::of(arb_entity_id()),
            prop::option::of(arb_table_name()),
            arb_timestamp(),
        )
            .prop_map(|(id, family_id, user_id, subject_table, created_at)| Activity {
                id,
                family_id,
                user_id,
                kind: "updated".to_string(),
                subject_id: subject_table.map(|_| id),
                subject_table: subject_table.map(|t| t.as_str().to_string()),
                details: serde_json::json!({}),
                created_at,
            })
    }

    // === Change Workloads ===

    /// One write against a table, as seen by the change log.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ChangeOp {
        /// Insert or update a row.
        Upsert { id: EntityId, family_id: EntityId, name: String },
        /// Set `deleted_at` on a row, if present.
        SoftDelete { id: EntityId },
        /// Physically delete a row.
        Delete { id: EntityId },
    }

    /// A single change over a small id space, so ops collide often.
    pub fn arb_change_op() -> impl Strategy<Value = ChangeOp> {
        prop_oneof![
            3 => (1i64..8, 1i64..3, "[a-z]{3,8}")
                .prop_map(|(id, family_id, name)| ChangeOp::Upsert { id, family_id, name }),
            1 => (1i64..8).prop_map(|id| ChangeOp::SoftDelete { id }),
            1 => (1i64..8).prop_map(|id| ChangeOp::Delete { id }),
        ]
    }

    /// A sequence of changes.
    pub fn arb_change_ops(max_len: usize) -> impl Strategy<Value = Vec<ChangeOp>> {
        prop::collection::vec(arb_change_op(), 0..max_len)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows with predictable field values.

    use super::*;

    pub fn user(id: EntityId, family_id: EntityId) -> User {
        User {
            id,
            family_id: Some(family_id),
            email: format!("user{id}@example.com"),
            display_name: format!("User {id}"),
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    pub fn family(id: EntityId, share_code: &str) -> Family {
        Family {
            id,
            name: format!("Family {id}"),
            share_code: share_code.to_string(),
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    /// A live product without a barcode.
    pub fn product(id: EntityId, family_id: EntityId) -> Product {
        Product {
            id,
            family_id,
            name: format!("Product {id}"),
            barcode: None,
            image_id: None,
            default_storage_location_id: None,
            minimum_quantity: 0,
            created_at: fixed_time(),
            updated_at: fixed_time(),
            deleted_at: None,
        }
    }

    pub fn product_line_item(id: EntityId, product_id: EntityId, family_id: EntityId) -> ProductLineItem {
        ProductLineItem {
            id,
            product_id,
            family_id,
            storage_location_id: None,
            quantity: 1,
            expires_on: None,
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    pub fn storage_location(id: EntityId, family_id: EntityId) -> StorageLocation {
        StorageLocation {
            id,
            family_id,
            name: format!("Shelf {id}"),
            created_at: fixed_time(),
            updated_at: fixed_time(),
            deleted_at: None,
        }
    }

    pub fn shopping_location(id: EntityId, family_id: EntityId) -> ShoppingLocation {
        ShoppingLocation {
            id,
            family_id,
            name: format!("Store {id}"),
            created_at: fixed_time(),
            updated_at: fixed_time(),
            deleted_at: None,
        }
    }

    pub fn shopping_list_item(id: EntityId, family_id: EntityId) -> ShoppingListItem {
        ShoppingListItem {
            id,
            family_id,
            product_id: None,
            shopping_location_id: None,
            title: format!("Item {id}"),
            quantity: 1,
            checked: false,
            created_at: fixed_time(),
            updated_at: fixed_time(),
        }
    }

    /// An activity row created at `created_at`.
    pub fn activity(id: EntityId, family_id: EntityId, created_at: Timestamp) -> Activity {
        Activity {
            id,
            family_id,
            user_id: None,
            kind: "created".to_string(),
            subject_table: Some(TableName::Products.as_str().to_string()),
            subject_id: Some(id),
            details: serde_json::json!({ "source": "fixture" }),
            created_at,
        }
    }
}
