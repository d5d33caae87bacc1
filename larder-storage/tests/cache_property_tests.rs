//! Property-Based Tests for Cache Reconciliation
//!
//! **Property 1: Convergence**
//!
//! For any sequence of writes, soft deletes and physical deletes, once every
//! change-log entry has been polled, each cached entry equals the row stored
//! in the database, and every absent row is absent from the cache.
//!
//! **Property 2: Idempotent Refresh**
//!
//! Refreshing the same id any number of times leaves the cache in the same
//! state as refreshing it once.
//!
//! **Property 3: Cursor Monotonicity**
//!
//! Across any interleaving of failing and succeeding refreshes the cursor
//! never decreases, and it never passes a change-log id whose refresh has
//! not succeeded.

use std::sync::Arc;

use larder_core::{EntityId, TableName};
use larder_storage::{CacheConfig, CacheCoordinator, DomainCaches, InMemoryStore};
use larder_test_utils::generators::{arb_change_ops, ChangeOp};
use larder_test_utils::fixtures;
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn started(store: &InMemoryStore) -> Result<CacheCoordinator, TestCaseError> {
    let caches = Arc::new(DomainCaches::new(store.sources()));
    let coordinator = CacheCoordinator::new(caches, store.change_log.clone(), CacheConfig::default());
    coordinator
        .start()
        .await
        .map_err(|e| TestCaseError::fail(format!("start failed: {}", e)))?;
    Ok(coordinator)
}

async fn apply(store: &InMemoryStore, op: &ChangeOp) {
    match op {
        ChangeOp::Upsert { id, family_id, name } => {
            let mut product = fixtures::product(*id, *family_id);
            product.name = name.clone();
            store.write(&store.products, product).await;
        }
        ChangeOp::SoftDelete { id } => {
            store.soft_delete(&store.products, *id).await;
        }
        ChangeOp::Delete { id } => {
            store.delete(&store.products, *id).await;
        }
    }
}

async fn assert_converged(
    store: &InMemoryStore,
    coordinator: &CacheCoordinator,
) -> Result<(), TestCaseError> {
    for id in 1..8 {
        let cached = coordinator.caches().products().peek(id);
        let stored = store.products.row(id).await;
        prop_assert_eq!(cached, stored, "product {} diverged", id);
    }
    Ok(())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// **Property 1: Convergence**
    #[test]
    fn prop_cache_converges_after_poll(
        ops in arb_change_ops(40),
        poll_points in prop::collection::vec(any::<bool>(), 40),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = InMemoryStore::new();
            let coordinator = started(&store).await?;

            for (op, poll_now) in ops.iter().zip(poll_points.iter()) {
                apply(&store, op).await;
                if *poll_now {
                    coordinator
                        .poll_once()
                        .await
                        .map_err(|e| TestCaseError::fail(format!("poll failed: {}", e)))?;
                }
            }

            coordinator
                .poll_once()
                .await
                .map_err(|e| TestCaseError::fail(format!("poll failed: {}", e)))?;

            prop_assert_eq!(coordinator.cursor(), ops.len() as i64);
            assert_converged(&store, &coordinator).await
        })?;
    }

    /// **Property 1: Convergence** (rows present before startup)
    #[test]
    fn prop_cache_converges_from_preloaded_state(
        before in arb_change_ops(20),
        after in arb_change_ops(20),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = InMemoryStore::new();
            for op in &before {
                apply(&store, op).await;
            }

            let coordinator = started(&store).await?;
            prop_assert_eq!(coordinator.cursor(), before.len() as i64);
            assert_converged(&store, &coordinator).await?;

            for op in &after {
                apply(&store, op).await;
            }
            coordinator
                .poll_once()
                .await
                .map_err(|e| TestCaseError::fail(format!("poll failed: {}", e)))?;
            assert_converged(&store, &coordinator).await
        })?;
    }

    /// **Property 2: Idempotent Refresh**
    #[test]
    fn prop_refresh_is_idempotent(
        ops in arb_change_ops(20),
        id in 1i64..8,
        repeats in 1usize..5,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = InMemoryStore::new();
            let coordinator = started(&store).await?;
            for op in &ops {
                apply(&store, op).await;
            }

            let caches = coordinator.caches();
            caches
                .refresh(TableName::Products, id)
                .await
                .map_err(|e| TestCaseError::fail(format!("refresh failed: {}", e)))?;
            let once = caches.products().peek(id);

            for _ in 0..repeats {
                caches
                    .refresh(TableName::Products, id)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("refresh failed: {}", e)))?;
            }
            prop_assert_eq!(caches.products().peek(id), once);
            Ok(())
        })?;
    }

    /// **Property 3: Cursor Monotonicity**
    #[test]
    fn prop_cursor_is_monotonic_and_never_skips_failures(
        ops in arb_change_ops(30),
        failing in prop::collection::hash_set(1i64..8, 0..3),
        cycles in 1usize..5,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = InMemoryStore::new();
            let coordinator = started(&store).await?;

            for id in &failing {
                store.products.fail_refresh_for(*id).await;
            }
            let mut log_ids: Vec<(i64, EntityId)> = Vec::new();
            for op in &ops {
                apply(&store, op).await;
                let record_id = match op {
                    ChangeOp::Upsert { id, .. }
                    | ChangeOp::SoftDelete { id }
                    | ChangeOp::Delete { id } => *id,
                };
                log_ids.push((log_ids.len() as i64 + 1, record_id));
            }

            let first_failure = log_ids
                .iter()
                .find(|(_, record_id)| failing.contains(record_id))
                .map(|(change_id, _)| *change_id);

            let mut last = coordinator.cursor();
            for _ in 0..cycles {
                coordinator
                    .poll_once()
                    .await
                    .map_err(|e| TestCaseError::fail(format!("poll failed: {}", e)))?;
                let cursor = coordinator.cursor();
                prop_assert!(cursor >= last);
                if let Some(blocked) = first_failure {
                    prop_assert_eq!(cursor, blocked - 1);
                }
                last = cursor;
            }

            for id in &failing {
                store.products.clear_refresh_failure(*id).await;
            }
            coordinator
                .poll_once()
                .await
                .map_err(|e| TestCaseError::fail(format!("poll failed: {}", e)))?;
            prop_assert_eq!(coordinator.cursor(), ops.len() as i64);
            assert_converged(&store, &coordinator).await
        })?;
    }
}
