//! Secondary lookup filters
//!
//! Each cached domain has a closed set of secondary lookups ("all locations
//! for a family", "family by share code"). A filter is evaluated in memory
//! with `matches` when the cache serves the lookup, and translated into a
//! WHERE clause by the database source otherwise. Both paths must agree.

use crate::{
    Activity, EntityId, Family, Product, ProductLineItem, ShoppingListItem, ShoppingLocation,
    StorageLocation, Timestamp, User,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserFilter {
    ByFamily(EntityId),
    /// Case-insensitive email match, using Unicode lowercasing like SQL `lower()`.
    ByEmail(String),
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::ByFamily(family_id) => user.family_id == Some(*family_id),
            UserFilter::ByEmail(email) => user.email.to_lowercase() == email.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyFilter {
    ByShareCode(String),
}

impl FamilyFilter {
    pub fn matches(&self, family: &Family) -> bool {
        match self {
            FamilyFilter::ByShareCode(code) => family.share_code == *code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductFilter {
    ByFamily(EntityId),
    ByBarcode { family_id: EntityId, barcode: String },
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            ProductFilter::ByFamily(family_id) => product.family_id == *family_id,
            ProductFilter::ByBarcode { family_id, barcode } => {
                product.family_id == *family_id && product.barcode.as_deref() == Some(barcode)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductLineItemFilter {
    ByFamily(EntityId),
    ByProduct(EntityId),
    ByStorageLocation(EntityId),
}

impl ProductLineItemFilter {
    pub fn matches(&self, item: &ProductLineItem) -> bool {
        match self {
            ProductLineItemFilter::ByFamily(id) => item.family_id == *id,
            ProductLineItemFilter::ByProduct(id) => item.product_id == *id,
            ProductLineItemFilter::ByStorageLocation(id) => item.storage_location_id == Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocationFilter {
    ByFamily(EntityId),
}

impl StorageLocationFilter {
    pub fn matches(&self, location: &StorageLocation) -> bool {
        match self {
            StorageLocationFilter::ByFamily(id) => location.family_id == *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShoppingLocationFilter {
    ByFamily(EntityId),
}

impl ShoppingLocationFilter {
    pub fn matches(&self, location: &ShoppingLocation) -> bool {
        match self {
            ShoppingLocationFilter::ByFamily(id) => location.family_id == *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShoppingListItemFilter {
    ByFamily(EntityId),
    ByProduct(EntityId),
    ByShoppingLocation(EntityId),
}

impl ShoppingListItemFilter {
    pub fn matches(&self, item: &ShoppingListItem) -> bool {
        match self {
            ShoppingListItemFilter::ByFamily(id) => item.family_id == *id,
            ShoppingListItemFilter::ByProduct(id) => item.product_id == Some(*id),
            ShoppingListItemFilter::ByShoppingLocation(id) => {
                item.shopping_location_id == Some(*id)
            }
        }
    }
}

/// Activity lookups are always bounded below by `since`, so the cache can
/// tell whether its loaded window covers the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityFilter {
    ByFamily { family_id: EntityId, since: Timestamp },
    ByUser { user_id: EntityId, since: Timestamp },
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        match self {
            ActivityFilter::ByFamily { family_id, since } => {
                activity.family_id == *family_id && activity.created_at >= *since
            }
            ActivityFilter::ByUser { user_id, since } => {
                activity.user_id == Some(*user_id) && activity.created_at >= *since
            }
        }
    }

    /// Lower time bound of the lookup.
    pub fn since(&self) -> Timestamp {
        match self {
            ActivityFilter::ByFamily { since, .. } | ActivityFilter::ByUser { since, .. } => *since,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(family_id: Option<EntityId>, email: &str) -> User {
        User {
            id: 1,
            family_id,
            email: email.to_string(),
            display_name: "Sam".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_filter() {
        let u = user(Some(7), "Sam@Example.com");
        assert!(UserFilter::ByFamily(7).matches(&u));
        assert!(!UserFilter::ByFamily(8).matches(&u));
        assert!(UserFilter::ByEmail("sam@example.com".to_string()).matches(&u));
        assert!(!UserFilter::ByFamily(7).matches(&user(None, "x@y.z")));
    }

    #[test]
    fn test_user_email_filter_folds_non_ascii_case() {
        let u = user(Some(7), "ÉLODIE@Exemple.fr");
        assert!(UserFilter::ByEmail("élodie@exemple.fr".to_string()).matches(&u));
        assert!(!UserFilter::ByEmail("elodie@exemple.fr".to_string()).matches(&u));
    }

    #[test]
    fn test_product_barcode_filter_requires_family() {
        let now = Utc::now();
        let product = Product {
            id: 3,
            family_id: 1,
            name: "Oat milk".to_string(),
            barcode: Some("4006381333931".to_string()),
            image_id: None,
            default_storage_location_id: None,
            minimum_quantity: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let hit = ProductFilter::ByBarcode {
            family_id: 1,
            barcode: "4006381333931".to_string(),
        };
        let other_family = ProductFilter::ByBarcode {
            family_id: 2,
            barcode: "4006381333931".to_string(),
        };
        assert!(hit.matches(&product));
        assert!(!other_family.matches(&product));
    }

    #[test]
    fn test_activity_filter_since() {
        let now = Utc::now();
        let activity = Activity {
            id: 1,
            family_id: 4,
            user_id: Some(9),
            kind: "product_added".to_string(),
            subject_table: None,
            subject_id: None,
            details: serde_json::Value::Null,
            created_at: now - Duration::days(2),
        };

        let recent = ActivityFilter::ByFamily {
            family_id: 4,
            since: now - Duration::days(1),
        };
        let wide = ActivityFilter::ByUser {
            user_id: 9,
            since: now - Duration::days(7),
        };
        assert!(!recent.matches(&activity));
        assert!(wide.matches(&activity));
        assert_eq!(wide.since(), now - Duration::days(7));
    }
}
