//! Change log access for cache reconciliation.
//!
//! Every write path appends `(id, table_name, record_id)` to one shared,
//! append-only table. Ids strictly increase; rows are never updated or
//! deleted by the cache layer. The coordinator reads the log through
//! [`ChangeLogSource`] and never writes to it.

use async_trait::async_trait;
use larder_core::{CacheError, ChangeLogEntry, EntityId, LarderResult, TableName};
use std::sync::atomic::{AtomicBool, Ordering};

/// Read access to the shared change log.
///
/// # Implementation Notes
///
/// - `entries_after` is called on every poll, usually returning nothing;
///   it should be cheap in that case (an index on `id` is enough)
/// - Entries must come back in ascending id order
#[async_trait]
pub trait ChangeLogSource: Send + Sync {
    /// Highest id currently in the log, or 0 when the log is empty.
    async fn max_id(&self) -> LarderResult<i64>;

    /// All entries with `id > cursor`, ascending by id.
    async fn entries_after(&self, cursor: i64) -> LarderResult<Vec<ChangeLogEntry>>;
}

/// In-memory change log for testing.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    entries: tokio::sync::RwLock<Vec<ChangeLogEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryChangeLog {
    /// Create a new, empty change log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change to a tracked table. Returns the new entry's id.
    pub async fn append(&self, table: TableName, record_id: EntityId) -> i64 {
        self.append_raw(table.as_str(), record_id).await
    }

    /// Record a change under an arbitrary table name, tracked or not.
    pub async fn append_raw(&self, table_name: &str, record_id: EntityId) -> i64 {
        let mut entries = self.entries.write().await;
        let id = entries.last().map(|e| e.id).unwrap_or(0) + 1;
        entries.push(ChangeLogEntry::new(id, table_name, record_id));
        id
    }

    /// Number of entries written so far.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Make every read fail until reset, simulating a lost connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> LarderResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::ChangeLogUnavailable {
                reason: "in-memory change log marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeLogSource for InMemoryChangeLog {
    async fn max_id(&self) -> LarderResult<i64> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries.last().map(|e| e.id).unwrap_or(0))
    }

    async fn entries_after(&self, cursor: i64) -> LarderResult<Vec<ChangeLogEntry>> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| e.id > cursor).cloned().collect())
    }
}
