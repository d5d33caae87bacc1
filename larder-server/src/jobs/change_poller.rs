//! Change Poller Background Task
//!
//! Replays the shared change log into the domain caches on a fixed interval.
//! One tick runs one [`CacheCoordinator::poll_once`]. A batch already in
//! progress is allowed to finish before shutdown is observed, since the
//! batch runs inside the tick arm of the select loop.
//!
//! Refresh failures are handled by the coordinator: it logs them, holds the
//! cursor and retries on the next tick. A failure to read the change log
//! itself is logged and counted here, and the next tick tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use larder_storage::{CacheCoordinator, PollOutcome};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for change poller activity.
#[derive(Debug, Default)]
pub struct PollerMetrics {
    /// Total poll cycles run
    pub cycles: AtomicU64,

    /// Change-log entries whose refresh succeeded
    pub entries_applied: AtomicU64,

    /// Change-log entries whose refresh failed (retries included)
    pub entries_failed: AtomicU64,

    /// Change-log entries naming an untracked table
    pub unknown_tables: AtomicU64,

    /// Cycles where the change log itself could not be read
    pub poll_errors: AtomicU64,
}

impl PollerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> PollerSnapshot {
        PollerSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            entries_applied: self.entries_applied.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
            unknown_tables: self.unknown_tables.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &PollOutcome) {
        self.entries_applied
            .fetch_add(outcome.applied as u64, Ordering::Relaxed);
        self.entries_failed
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);
        self.unknown_tables
            .fetch_add(outcome.unknown_tables as u64, Ordering::Relaxed);
    }
}

/// Snapshot of poller metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerSnapshot {
    pub cycles: u64,
    pub entries_applied: u64,
    pub entries_failed: u64,
    pub unknown_tables: u64,
    pub poll_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that keeps the domain caches reconciled.
///
/// The coordinator must already be started. Runs until the shutdown signal
/// is received or its sender is dropped, and returns the metrics collected
/// over its lifetime.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(change_poller_task(coordinator.clone(), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn change_poller_task(
    coordinator: Arc<CacheCoordinator>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<PollerMetrics> {
    let metrics = Arc::new(PollerMetrics::new());
    let poll_interval = coordinator.config().poll_interval;

    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        poll_interval_ms = poll_interval.as_millis() as u64,
        cursor = coordinator.cursor(),
        "Change poller started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => {
                        tracing::info!("Change poller shutting down");
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => {
                        tracing::info!("Shutdown sender dropped, change poller stopping");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                poll_cycle(&coordinator, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        entries_applied = snapshot.entries_applied,
        entries_failed = snapshot.entries_failed,
        unknown_tables = snapshot.unknown_tables,
        poll_errors = snapshot.poll_errors,
        cursor = coordinator.cursor(),
        "Change poller stopped"
    );

    metrics
}

/// Run one poll and record its outcome.
async fn poll_cycle(coordinator: &CacheCoordinator, metrics: &PollerMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    match coordinator.poll_once().await {
        Ok(outcome) => {
            metrics.record(&outcome);
            if outcome.is_idle() {
                tracing::trace!(cursor = outcome.cursor_after, "No new changes");
            }
        }
        Err(e) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                error = %e,
                cursor = coordinator.cursor(),
                "Failed to read change log"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_storage::{CacheConfig, DomainCaches, InMemoryStore};
    use larder_test_utils::fixtures;
    use std::time::Duration;

    async fn started(store: &InMemoryStore) -> Arc<CacheCoordinator> {
        let config = CacheConfig::new().with_poll_interval(Duration::from_millis(10));
        let caches = Arc::new(DomainCaches::new(store.sources()));
        let coordinator = Arc::new(CacheCoordinator::new(
            caches,
            store.change_log.clone(),
            config,
        ));
        coordinator.start().await.expect("start should succeed");
        coordinator
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = PollerMetrics::new();
        metrics.record(&PollOutcome {
            entries_seen: 4,
            applied: 2,
            failed: 1,
            unknown_tables: 1,
            ..Default::default()
        });
        metrics.cycles.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.entries_applied, 2);
        assert_eq!(snapshot.entries_failed, 1);
        assert_eq!(snapshot.unknown_tables, 1);
        assert_eq!(snapshot.poll_errors, 0);
    }

    #[tokio::test]
    async fn test_poller_applies_changes_and_stops_on_shutdown() {
        let store = InMemoryStore::new();
        let coordinator = started(&store).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(change_poller_task(coordinator.clone(), shutdown_rx));

        store.write(&store.families, fixtures::family(7, "K7Q2XZ")).await;

        let mut converged = false;
        for _ in 0..200 {
            if coordinator.cursor() == 1 {
                converged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(converged, "poller should reach the new entry");
        assert!(coordinator.caches().families().peek(7).is_some());

        let _ = shutdown_tx.send(true);
        let metrics = handle.await.expect("poller task should not panic");
        let snapshot = metrics.snapshot();
        assert!(snapshot.cycles >= 1);
        assert_eq!(snapshot.entries_applied, 1);
    }

    #[tokio::test]
    async fn test_poller_stops_when_shutdown_sender_dropped() {
        let store = InMemoryStore::new();
        let coordinator = started(&store).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(change_poller_task(coordinator, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(shutdown_tx);

        let metrics = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller should stop once the sender is gone")
            .expect("poller task should not panic");
        assert_eq!(metrics.snapshot().poll_errors, 0);
    }

    #[tokio::test]
    async fn test_poller_counts_change_log_errors() {
        let store = InMemoryStore::new();
        let coordinator = started(&store).await;
        store.change_log.set_unavailable(true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(change_poller_task(coordinator.clone(), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let _ = shutdown_tx.send(true);
        let metrics = handle.await.expect("poller task should not panic");
        assert!(metrics.snapshot().poll_errors >= 1);
        assert_eq!(coordinator.cursor(), 0);
    }
}
