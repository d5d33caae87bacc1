//! Row mapping between Postgres and the cached entity types.
//!
//! Each entity names its column list, whether its table carries
//! `deleted_at`, how to decode a row, and how its filter enum becomes a
//! `WHERE` fragment. The fragments must select exactly the rows the in-memory
//! `matches` accepts.

use larder_core::{
    Activity, ActivityFilter, Family, FamilyFilter, Product, ProductFilter, ProductLineItem,
    ProductLineItemFilter, ShoppingListItem, ShoppingListItemFilter, ShoppingLocation,
    ShoppingLocationFilter, StorageLocation, StorageLocationFilter, User, UserFilter,
};
use larder_storage::CacheableEntity;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// Owned query parameter.
pub type SqlParam = Box<dyn ToSql + Sync + Send>;

/// A `WHERE` fragment using `$1..$n` and its parameters, in order.
pub type WhereClause = (String, Vec<SqlParam>);

/// Postgres mapping for a cached entity.
pub trait PgEntity: CacheableEntity {
    /// Comma-separated select list.
    const COLUMNS: &'static str;

    /// Whether the table has a `deleted_at` column hiding rows from normal reads.
    const SOFT_DELETE: bool = false;

    /// Decode one row selected with [`COLUMNS`](Self::COLUMNS).
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>;

    /// Translate a secondary lookup filter into SQL.
    fn where_clause(filter: &Self::Filter) -> WhereClause;
}

fn param<T: ToSql + Sync + Send + 'static>(value: T) -> SqlParam {
    Box::new(value)
}

impl PgEntity for User {
    const COLUMNS: &'static str = "id, family_id, email, display_name, created_at, updated_at";

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(User {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn where_clause(filter: &UserFilter) -> WhereClause {
        match filter {
            UserFilter::ByFamily(family_id) => ("family_id = $1".into(), vec![param(*family_id)]),
            UserFilter::ByEmail(email) => (
                "lower(email) = lower($1)".into(),
                vec![param(email.clone())],
            ),
        }
    }
}

impl PgEntity for Family {
    const COLUMNS: &'static str = "id, name, share_code, created_at, updated_at";

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Family {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            share_code: row.try_get("share_code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn where_clause(filter: &FamilyFilter) -> WhereClause {
        match filter {
            FamilyFilter::ByShareCode(code) => ("share_code = $1".into(), vec![param(code.clone())]),
        }
    }
}

impl PgEntity for Product {
    const COLUMNS: &'static str = "id, family_id, name, barcode, image_id, \
        default_storage_location_id, minimum_quantity, created_at, updated_at, deleted_at";
    const SOFT_DELETE: bool = true;

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Product {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            name: row.try_get("name")?,
            barcode: row.try_get("barcode")?,
            image_id: row.try_get("image_id")?,
            default_storage_location_id: row.try_get("default_storage_location_id")?,
            minimum_quantity: row.try_get("minimum_quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn where_clause(filter: &ProductFilter) -> WhereClause {
        match filter {
            ProductFilter::ByFamily(family_id) => {
                ("family_id = $1".into(), vec![param(*family_id)])
            }
            ProductFilter::ByBarcode { family_id, barcode } => (
                "family_id = $1 AND barcode = $2".into(),
                vec![param(*family_id), param(barcode.clone())],
            ),
        }
    }
}

impl PgEntity for ProductLineItem {
    const COLUMNS: &'static str = "id, product_id, family_id, storage_location_id, quantity, \
        expires_on, created_at, updated_at";

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(ProductLineItem {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            family_id: row.try_get("family_id")?,
            storage_location_id: row.try_get("storage_location_id")?,
            quantity: row.try_get("quantity")?,
            expires_on: row.try_get("expires_on")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn where_clause(filter: &ProductLineItemFilter) -> WhereClause {
        match *filter {
            ProductLineItemFilter::ByFamily(id) => ("family_id = $1".into(), vec![param(id)]),
            ProductLineItemFilter::ByProduct(id) => ("product_id = $1".into(), vec![param(id)]),
            ProductLineItemFilter::ByStorageLocation(id) => {
                ("storage_location_id = $1".into(), vec![param(id)])
            }
        }
    }
}

const LOCATION_COLUMNS: &str = "id, family_id, name, created_at, updated_at, deleted_at";

impl PgEntity for StorageLocation {
    const COLUMNS: &'static str = LOCATION_COLUMNS;
    const SOFT_DELETE: bool = true;

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(StorageLocation {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn where_clause(filter: &StorageLocationFilter) -> WhereClause {
        match filter {
            StorageLocationFilter::ByFamily(id) => ("family_id = $1".into(), vec![param(*id)]),
        }
    }
}

impl PgEntity for ShoppingLocation {
    const COLUMNS: &'static str = LOCATION_COLUMNS;
    const SOFT_DELETE: bool = true;

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(ShoppingLocation {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn where_clause(filter: &ShoppingLocationFilter) -> WhereClause {
        match filter {
            ShoppingLocationFilter::ByFamily(id) => ("family_id = $1".into(), vec![param(*id)]),
        }
    }
}

impl PgEntity for ShoppingListItem {
    const COLUMNS: &'static str = "id, family_id, product_id, shopping_location_id, title, \
        quantity, checked, created_at, updated_at";

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(ShoppingListItem {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            product_id: row.try_get("product_id")?,
            shopping_location_id: row.try_get("shopping_location_id")?,
            title: row.try_get("title")?,
            quantity: row.try_get("quantity")?,
            checked: row.try_get("checked")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn where_clause(filter: &ShoppingListItemFilter) -> WhereClause {
        match *filter {
            ShoppingListItemFilter::ByFamily(id) => ("family_id = $1".into(), vec![param(id)]),
            ShoppingListItemFilter::ByProduct(id) => ("product_id = $1".into(), vec![param(id)]),
            ShoppingListItemFilter::ByShoppingLocation(id) => {
                ("shopping_location_id = $1".into(), vec![param(id)])
            }
        }
    }
}

impl PgEntity for Activity {
    const COLUMNS: &'static str =
        "id, family_id, user_id, kind, subject_table, subject_id, details, created_at";

    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Activity {
            id: row.try_get("id")?,
            family_id: row.try_get("family_id")?,
            user_id: row.try_get("user_id")?,
            kind: row.try_get("kind")?,
            subject_table: row.try_get("subject_table")?,
            subject_id: row.try_get("subject_id")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn where_clause(filter: &ActivityFilter) -> WhereClause {
        match *filter {
            ActivityFilter::ByFamily { family_id, since } => (
                "family_id = $1 AND created_at >= $2".into(),
                vec![param(family_id), param(since)],
            ),
            ActivityFilter::ByUser { user_id, since } => (
                "user_id = $1 AND created_at >= $2".into(),
                vec![param(user_id), param(since)],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_where_clause_param_counts() {
        let (sql, params) = Product::where_clause(&ProductFilter::ByBarcode {
            family_id: 3,
            barcode: "4006381333931".to_string(),
        });
        assert_eq!(sql, "family_id = $1 AND barcode = $2");
        assert_eq!(params.len(), 2);

        let (sql, params) = Activity::where_clause(&ActivityFilter::ByUser {
            user_id: 9,
            since: Utc::now(),
        });
        assert!(sql.starts_with("user_id = $1"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_soft_delete_tables() {
        assert!(Product::SOFT_DELETE);
        assert!(StorageLocation::SOFT_DELETE);
        assert!(ShoppingLocation::SOFT_DELETE);
        assert!(!User::SOFT_DELETE);
        assert!(!Activity::SOFT_DELETE);
    }

    #[test]
    fn test_email_lookup_is_case_insensitive_in_sql() {
        let (sql, _) = User::where_clause(&UserFilter::ByEmail("A@B.com".to_string()));
        assert!(sql.contains("lower(email)"));
    }
}
