//! Startup sequencing and change-log replay.
//!
//! The coordinator owns the single poll cursor shared by all domains. On
//! [`start`](CacheCoordinator::start) it reads the highest change-log id
//! *before* bulk loading, so any write that lands during initialization is
//! replayed on the first poll. Each [`poll_once`](CacheCoordinator::poll_once)
//! then processes one batch of entries in id order.
//!
//! # Failure handling
//!
//! The cursor advances past an entry only if that entry and every entry
//! before it in the batch succeeded. After the first failure the remaining
//! entries are still applied (refreshes are idempotent), but the cursor stays
//! on the last good id, so the failed entry is retried on every cycle until
//! it succeeds. Repeated failures on the same entry escalate from WARN to
//! ERROR after [`CacheConfig::stuck_alert_after`] cycles.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use larder_core::{CacheError, ChangeLogEntry, HealthCheck, LarderError, LarderResult};

use super::change_log::ChangeLogSource;
use super::config::CacheConfig;
use super::registry::DomainCaches;

const COMPONENT: &str = "cache_coordinator";

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Entries returned by the change log.
    pub entries_seen: usize,
    /// Entries whose refresh succeeded.
    pub applied: usize,
    /// Entries whose refresh failed.
    pub failed: usize,
    /// Entries naming a table with no cache. Skipped and advanced past.
    pub unknown_tables: usize,
    pub cursor_before: i64,
    pub cursor_after: i64,
    /// First entry that failed this cycle, if any. The cursor stops before it.
    pub blocked_at: Option<i64>,
}

impl PollOutcome {
    /// Whether the change log had nothing new.
    pub fn is_idle(&self) -> bool {
        self.entries_seen == 0
    }
}

/// Owns the poll cursor and drives every domain cache.
pub struct CacheCoordinator {
    caches: Arc<DomainCaches>,
    change_log: Arc<dyn ChangeLogSource>,
    config: CacheConfig,
    cursor: AtomicI64,
    started: AtomicBool,
    /// Change-log id that failed on the previous cycle, 0 when none.
    stuck_id: AtomicI64,
    /// Consecutive cycles `stuck_id` has failed.
    stuck_failures: AtomicU64,
}

impl CacheCoordinator {
    pub fn new(
        caches: Arc<DomainCaches>,
        change_log: Arc<dyn ChangeLogSource>,
        config: CacheConfig,
    ) -> Self {
        Self {
            caches,
            change_log,
            config,
            cursor: AtomicI64::new(0),
            started: AtomicBool::new(false),
            stuck_id: AtomicI64::new(0),
            stuck_failures: AtomicU64::new(0),
        }
    }

    pub fn caches(&self) -> &Arc<DomainCaches> {
        &self.caches
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Highest change-log id known to be fully applied.
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The entry currently blocking the cursor and how many cycles it has failed.
    pub fn stuck_entry(&self) -> Option<(i64, u64)> {
        match self.stuck_id.load(Ordering::Acquire) {
            0 => None,
            id => Some((id, self.stuck_failures.load(Ordering::Acquire))),
        }
    }

    /// Compute the cursor, then bulk load every cache.
    ///
    /// Any error is fatal: the process must not serve traffic from
    /// partially initialized caches.
    pub async fn start(&self) -> LarderResult<()> {
        if self.is_started() {
            tracing::warn!("Cache coordinator already started");
            return Ok(());
        }

        let started = Instant::now();
        let cursor = self.change_log.max_id().await.map_err(|e| match e {
            LarderError::Cache(err @ CacheError::ChangeLogUnavailable { .. }) => {
                LarderError::Cache(err)
            }
            other => LarderError::from(CacheError::ChangeLogUnavailable {
                reason: other.to_string(),
            }),
        })?;
        self.cursor.store(cursor, Ordering::Release);
        tracing::info!(cursor, "Change log cursor computed");

        self.caches.initialize_all(&self.config).await?;
        self.started.store(true, Ordering::Release);

        tracing::info!(
            cursor,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Domain caches initialized"
        );
        Ok(())
    }

    /// Process every change-log entry after the cursor.
    ///
    /// A change-log read failure is returned without touching any cache.
    /// Refresh failures are logged here and reported in the outcome.
    pub async fn poll_once(&self) -> LarderResult<PollOutcome> {
        if !self.is_started() {
            return Err(CacheError::NotStarted.into());
        }

        let cursor_before = self.cursor();
        let mut entries = self.change_log.entries_after(cursor_before).await?;
        entries.sort_by_key(|entry| entry.id);

        let mut outcome = PollOutcome {
            entries_seen: entries.len(),
            cursor_before,
            cursor_after: cursor_before,
            ..Default::default()
        };

        for entry in &entries {
            let blocked = outcome.blocked_at.is_some();

            let Some(table) = entry.table() else {
                outcome.unknown_tables += 1;
                tracing::warn!(
                    change_id = entry.id,
                    table_name = %entry.table_name,
                    record_id = entry.record_id,
                    "Skipping change log entry for untracked table"
                );
                if !blocked {
                    self.advance(entry.id);
                }
                continue;
            };

            match self.caches.refresh(table, entry.record_id).await {
                Ok(_) => {
                    outcome.applied += 1;
                    if !blocked {
                        self.advance(entry.id);
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    if blocked {
                        tracing::warn!(
                            change_id = entry.id,
                            table = %table,
                            record_id = entry.record_id,
                            error = %e,
                            "Cache refresh failed behind a blocked entry"
                        );
                    } else {
                        outcome.blocked_at = Some(entry.id);
                        self.record_stuck(entry, &e);
                    }
                }
            }
        }

        if outcome.blocked_at.is_none() {
            self.clear_stuck();
        }

        outcome.cursor_after = self.cursor();
        if !outcome.is_idle() {
            tracing::debug!(
                entries = outcome.entries_seen,
                applied = outcome.applied,
                failed = outcome.failed,
                unknown = outcome.unknown_tables,
                cursor = outcome.cursor_after,
                "Change log batch processed"
            );
        }
        Ok(outcome)
    }

    /// Component health for the readiness probe.
    ///
    /// Degraded while an entry blocks the cursor, Unhealthy once it has
    /// failed `stuck_alert_after` consecutive cycles.
    pub fn health(&self) -> HealthCheck {
        if !self.is_started() {
            return HealthCheck::unknown(COMPONENT, "caches not initialized");
        }

        let check = match self.stuck_entry() {
            Some((id, failures)) => {
                let message =
                    format!("change log entry {id} has failed {failures} consecutive cycles");
                let check = if failures >= self.config.stuck_alert_after {
                    HealthCheck::unhealthy(COMPONENT, message)
                } else {
                    HealthCheck::degraded(COMPONENT, message)
                };
                check
                    .with_metadata("stuck_change_id", serde_json::json!(id))
                    .with_metadata("stuck_failures", serde_json::json!(failures))
            }
            None => HealthCheck::healthy(COMPONENT),
        };
        check.with_metadata("cursor", serde_json::json!(self.cursor()))
    }

    fn advance(&self, id: i64) {
        self.cursor.fetch_max(id, Ordering::AcqRel);
    }

    fn record_stuck(&self, entry: &ChangeLogEntry, error: &LarderError) {
        let failures = if self.stuck_id.swap(entry.id, Ordering::AcqRel) == entry.id {
            self.stuck_failures.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.stuck_failures.store(1, Ordering::Release);
            1
        };

        if failures >= self.config.stuck_alert_after {
            tracing::error!(
                change_id = entry.id,
                table_name = %entry.table_name,
                record_id = entry.record_id,
                failures,
                error = %error,
                "Change log entry stuck, cursor not advancing"
            );
        } else {
            tracing::warn!(
                change_id = entry.id,
                table_name = %entry.table_name,
                record_id = entry.record_id,
                failures,
                error = %error,
                "Cache refresh failed, will retry next cycle"
            );
        }
    }

    fn clear_stuck(&self) {
        let previous = self.stuck_id.swap(0, Ordering::AcqRel);
        let failures = self.stuck_failures.swap(0, Ordering::AcqRel);
        if previous != 0 {
            tracing::info!(change_id = previous, failures, "Change log entry recovered");
        }
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("cursor", &self.cursor())
            .field("started", &self.is_started())
            .field("stuck_entry", &self.stuck_entry())
            .field("config", &self.config)
            .finish()
    }
}
