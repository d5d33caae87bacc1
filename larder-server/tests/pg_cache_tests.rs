#![cfg(feature = "db-tests")]
//! Postgres-backed tests for the cache sources and the change log.
//!
//! Requires a reachable database configured through `LARDER_DB_*`.

use std::sync::Arc;

use larder_core::{FamilyFilter, TableName};
use larder_server::PgSource;
use larder_storage::{CacheConfig, CacheCoordinator, DomainCaches, EntitySource};

#[path = "support/db.rs"]
mod test_db_support;
use test_db_support::{test_store, unique_share_code};

async fn insert_family(pool: &deadpool_postgres::Pool, share_code: &str) -> i64 {
    let conn = pool.get().await.expect("connection");
    let row = conn
        .query_one(
            "INSERT INTO families (name, share_code) VALUES ($1, $2) RETURNING id",
            &[&"Test family", &share_code],
        )
        .await
        .expect("insert family");
    row.get(0)
}

async fn log_change(pool: &deadpool_postgres::Pool, table: TableName, record_id: i64) {
    let conn = pool.get().await.expect("connection");
    conn.execute(
        "INSERT INTO change_log (table_name, record_id) VALUES ($1, $2)",
        &[&table.as_str(), &record_id],
    )
    .await
    .expect("insert change log entry");
}

#[tokio::test]
async fn test_family_source_reads_by_share_code() {
    let (_, pool) = test_store().await;
    let code = unique_share_code();
    let id = insert_family(&pool, &code).await;

    let source = PgSource::<larder_core::Family>::new(pool.clone());
    let fetched = source.fetch(id).await.expect("fetch");
    assert_eq!(fetched.map(|f| f.share_code), Some(code.clone()));

    let matched = source
        .fetch_matching(&FamilyFilter::ByShareCode(code))
        .await
        .expect("fetch_matching");
    assert_eq!(matched.iter().map(|f| f.id).collect::<Vec<_>>(), vec![id]);
}

#[tokio::test]
async fn test_soft_deleted_location_is_hidden_but_refreshable() {
    let (_, pool) = test_store().await;
    let family_id = insert_family(&pool, &unique_share_code()).await;
    let conn = pool.get().await.expect("connection");
    let row = conn
        .query_one(
            "INSERT INTO storage_locations (family_id, name, deleted_at) \
             VALUES ($1, 'Old shelf', now()) RETURNING id",
            &[&family_id],
        )
        .await
        .expect("insert storage location");
    let id: i64 = row.get(0);

    let source = PgSource::<larder_core::StorageLocation>::new(pool.clone());
    assert!(source.fetch(id).await.expect("fetch").is_none());
    let raw = source.fetch_unfiltered(id).await.expect("fetch_unfiltered");
    assert!(raw.is_some_and(|l| l.is_deleted()));
}

#[tokio::test]
async fn test_coordinator_replays_postgres_change_log() {
    let (store, pool) = test_store().await;
    let caches = Arc::new(DomainCaches::new(store.sources()));
    let coordinator = CacheCoordinator::new(caches, store.change_log(), CacheConfig::default());
    coordinator.start().await.expect("start");
    let start_cursor = coordinator.cursor();

    let code = unique_share_code();
    let id = insert_family(&pool, &code).await;
    log_change(&pool, TableName::Families, id).await;

    let outcome = coordinator.poll_once().await.expect("poll");
    assert!(outcome.applied >= 1);
    assert!(coordinator.cursor() > start_cursor);

    let family = coordinator
        .caches()
        .family_by_share_code(&code)
        .await
        .expect("lookup");
    assert_eq!(family.map(|f| f.id), Some(id));
}
