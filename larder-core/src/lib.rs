//! Larder Core - Entity Types
//!
//! Pure data structures shared by the cache layer and the server. This crate
//! holds the eight cached entity domains, the table-name enumeration used to
//! route change-log rows, the error hierarchy and health report types.
//! It contains no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod entities;
pub mod error;
pub mod filter;
pub mod health;

pub use entities::*;
pub use error::{CacheError, ConfigError, LarderError, LarderResult, StorageError};
pub use filter::*;
pub use health::{HealthCheck, HealthStatus};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Primary key of every cached row. All tracked tables use bigserial keys.
pub type EntityId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// TABLE NAMES
// ============================================================================

/// Closed set of tables tracked by the change log.
///
/// This is the only place table-name strings are interpreted. Change-log rows
/// naming anything else are reported by [`TableName::parse`] as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Users,
    Families,
    Products,
    ProductLineItems,
    StorageLocations,
    ShoppingLocations,
    ShoppingListItems,
    Activities,
}

impl TableName {
    /// Every tracked table, in cache initialization order.
    pub const ALL: [TableName; 8] = [
        TableName::Users,
        TableName::Families,
        TableName::Products,
        TableName::ProductLineItems,
        TableName::StorageLocations,
        TableName::ShoppingLocations,
        TableName::ShoppingListItems,
        TableName::Activities,
    ];

    /// The table name as written into the change log.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableName::Users => "users",
            TableName::Families => "families",
            TableName::Products => "products",
            TableName::ProductLineItems => "product_line_items",
            TableName::StorageLocations => "storage_locations",
            TableName::ShoppingLocations => "shopping_locations",
            TableName::ShoppingListItems => "shopping_list_items",
            TableName::Activities => "activities",
        }
    }

    /// Parse a change-log table name. Matching is exact.
    pub fn parse(name: &str) -> Option<TableName> {
        TableName::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHANGE LOG
// ============================================================================

/// One row of the shared append-only change log.
///
/// `table_name` is kept as the raw string so that rows written by a newer
/// schema (or by mistake) can still be read and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: EntityId,
}

impl ChangeLogEntry {
    pub fn new(id: i64, table_name: impl Into<String>, record_id: EntityId) -> Self {
        Self {
            id,
            table_name: table_name.into(),
            record_id,
        }
    }

    /// The tracked table this entry refers to, if any.
    pub fn table(&self) -> Option<TableName> {
        TableName::parse(&self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_roundtrip() {
        for table in TableName::ALL {
            assert_eq!(TableName::parse(table.as_str()), Some(table));
            assert_eq!(table.to_string(), table.as_str());
        }
    }

    #[test]
    fn test_table_name_unknown() {
        assert_eq!(TableName::parse("recipes"), None);
        assert_eq!(TableName::parse("Users"), None);
        assert_eq!(TableName::parse(""), None);
    }

    #[test]
    fn test_change_log_entry_table() {
        let entry = ChangeLogEntry::new(1, "shopping_list_items", 42);
        assert_eq!(entry.table(), Some(TableName::ShoppingListItems));

        let unknown = ChangeLogEntry::new(2, "audit_trail", 7);
        assert_eq!(unknown.table(), None);
    }
}
