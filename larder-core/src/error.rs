//! Error types for Larder operations

use crate::{EntityId, TableName};
use thiserror::Error;

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query on {table} failed: {reason}")]
    Query { table: String, reason: String },

    #[error("Connection pool error: {reason}")]
    Pool { reason: String },

    #[error("Failed to decode {table} row: {reason}")]
    RowDecode { table: String, reason: String },
}

/// Cache lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Initial load of {table} cache failed: {reason}")]
    InitializationFailed { table: TableName, reason: String },

    #[error("Refresh of {table} row {id} failed: {reason}")]
    RefreshFailed {
        table: TableName,
        id: EntityId,
        reason: String,
    },

    #[error("Change log unavailable: {reason}")]
    ChangeLogUnavailable { reason: String },

    #[error("Cache coordinator polled before start")]
    NotStarted,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Telemetry initialization failed: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all Larder errors.
#[derive(Debug, Clone, Error)]
pub enum LarderError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Larder operations.
pub type LarderResult<T> = Result<T, LarderError>;

// =============================================================================
// TESTS
// =============================================================================
