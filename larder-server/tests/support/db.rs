use deadpool_postgres::Pool;
use larder_server::{DbConfig, PgStore};

pub const SCHEMA: &str = include_str!("../../migrations/V1__cached_tables.sql");

/// Pool against the database named by `LARDER_DB_*`, with the schema applied.
pub async fn test_pool() -> Pool {
    let config = DbConfig::from_env();
    let pool = config.create_pool().expect("Failed to create database pool");
    let conn = pool.get().await.expect("Failed to connect to test database");
    conn.batch_execute(SCHEMA)
        .await
        .expect("Failed to apply schema");
    pool
}

pub async fn test_store() -> (PgStore, Pool) {
    let pool = test_pool().await;
    (PgStore::new(pool.clone()), pool)
}

/// A share code unlikely to collide with earlier runs.
pub fn unique_share_code() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("T{:X}", nanos)
}
