//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres, and the Postgres
//! implementations of the cache's persistence boundary:
//!
//! - [`PgSource<T>`]: the read queries one domain cache needs
//! - [`PgChangeLog`]: reads of the shared `change_log` table
//! - [`PgStore`]: one pool handing out both

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use larder_core::{
    Activity, ChangeLogEntry, EntityId, Family, LarderError, LarderResult, Product,
    ProductLineItem, ShoppingListItem, ShoppingLocation, StorageError, StorageLocation, User,
};
use larder_storage::{CacheSources, ChangeLogSource, EntitySource, LoadWindow};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::pg_entities::PgEntity;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "larder".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `LARDER_DB_HOST` (default: localhost)
    /// - `LARDER_DB_PORT` (default: 5432)
    /// - `LARDER_DB_NAME` (default: larder)
    /// - `LARDER_DB_USER` (default: postgres)
    /// - `LARDER_DB_PASSWORD` (default: empty)
    /// - `LARDER_DB_POOL_SIZE` (default: 16)
    /// - `LARDER_DB_TIMEOUT`: seconds (default: 30)
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LARDER_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("LARDER_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("LARDER_DB_NAME").unwrap_or_else(|_| "larder".to_string()),
            user: std::env::var("LARDER_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("LARDER_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("LARDER_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("LARDER_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> LarderResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Pool {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: deadpool_postgres::PoolError) -> LarderError {
    tracing::error!("Connection pool error: {:?}", err);
    let reason = match err {
        deadpool_postgres::PoolError::Timeout(_) => "connection pool exhausted".to_string(),
        deadpool_postgres::PoolError::Closed => "connection pool is closed".to_string(),
        other => other.to_string(),
    };
    StorageError::Pool { reason }.into()
}

fn query_error(table: &str, err: tokio_postgres::Error) -> LarderError {
    StorageError::Query {
        table: table.to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn decode_error(table: &str, err: tokio_postgres::Error) -> LarderError {
    StorageError::RowDecode {
        table: table.to_string(),
        reason: err.to_string(),
    }
    .into()
}

async fn connection(pool: &Pool) -> LarderResult<deadpool_postgres::Object> {
    pool.get().await.map_err(pool_error)
}

// ============================================================================
// ENTITY SOURCE
// ============================================================================

/// Read queries for one cached table.
pub struct PgSource<T> {
    pool: Pool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: PgEntity> PgSource<T> {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    fn table(&self) -> &'static str {
        T::TABLE.as_str()
    }

    fn select(&self) -> String {
        format!("SELECT {} FROM {}", T::COLUMNS, self.table())
    }

    fn visibility(&self) -> &'static str {
        if T::SOFT_DELETE {
            " AND deleted_at IS NULL"
        } else {
            ""
        }
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> LarderResult<Vec<T>> {
        let conn = connection(&self.pool).await?;
        let rows = conn
            .query(sql, params)
            .await
            .map_err(|e| query_error(self.table(), e))?;
        self.decode(&rows)
    }

    async fn query_opt(&self, sql: &str, id: EntityId) -> LarderResult<Option<T>> {
        let conn = connection(&self.pool).await?;
        let row = conn
            .query_opt(sql, &[&id])
            .await
            .map_err(|e| query_error(self.table(), e))?;
        row.map(|row| T::from_row(&row).map_err(|e| decode_error(self.table(), e)))
            .transpose()
    }

    fn decode(&self, rows: &[Row]) -> LarderResult<Vec<T>> {
        rows.iter()
            .map(|row| T::from_row(row).map_err(|e| decode_error(self.table(), e)))
            .collect()
    }
}

#[async_trait]
impl<T: PgEntity> EntitySource<T> for PgSource<T> {
    async fn load_initial(&self, window: LoadWindow) -> LarderResult<Vec<T>> {
        match window {
            LoadWindow::All => self.query(&self.select(), &[]).await,
            LoadWindow::Since(start) => {
                let sql = format!("{} WHERE created_at >= $1", self.select());
                self.query(&sql, &[&start]).await
            }
        }
    }

    async fn fetch(&self, id: EntityId) -> LarderResult<Option<T>> {
        let sql = format!("{} WHERE id = $1{}", self.select(), self.visibility());
        self.query_opt(&sql, id).await
    }

    async fn fetch_unfiltered(&self, id: EntityId) -> LarderResult<Option<T>> {
        let sql = format!("{} WHERE id = $1", self.select());
        self.query_opt(&sql, id).await
    }

    async fn fetch_many(&self, ids: &[EntityId]) -> LarderResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{} WHERE id = ANY($1){}", self.select(), self.visibility());
        let ids = ids.to_vec();
        self.query(&sql, &[&ids]).await
    }

    async fn fetch_matching(&self, filter: &T::Filter) -> LarderResult<Vec<T>> {
        let (clause, params) = T::where_clause(filter);
        let sql = format!(
            "{} WHERE {}{} ORDER BY id",
            self.select(),
            clause,
            self.visibility()
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        self.query(&sql, &refs).await
    }
}

// ============================================================================
// CHANGE LOG
// ============================================================================

/// The shared `change_log` table.
#[derive(Clone)]
pub struct PgChangeLog {
    pool: Pool,
}

impl PgChangeLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeLogSource for PgChangeLog {
    async fn max_id(&self) -> LarderResult<i64> {
        let conn = connection(&self.pool).await?;
        let row = conn
            .query_one("SELECT COALESCE(MAX(id), 0)::BIGINT FROM change_log", &[])
            .await
            .map_err(|e| query_error("change_log", e))?;
        row.try_get(0).map_err(|e| decode_error("change_log", e))
    }

    async fn entries_after(&self, cursor: i64) -> LarderResult<Vec<ChangeLogEntry>> {
        let conn = connection(&self.pool).await?;
        let rows = conn
            .query(
                "SELECT id, table_name, record_id FROM change_log WHERE id > $1 ORDER BY id ASC",
                &[&cursor],
            )
            .await
            .map_err(|e| query_error("change_log", e))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let table_name: String = row.try_get("table_name")?;
                let record_id: i64 = row.try_get("record_id")?;
                Ok(ChangeLogEntry::new(id, table_name, record_id))
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(|e| decode_error("change_log", e))
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Postgres sources for every cached domain, sharing one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> LarderResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    pub fn sources(&self) -> CacheSources {
        CacheSources {
            users: Arc::new(PgSource::<User>::new(self.pool.clone())),
            families: Arc::new(PgSource::<Family>::new(self.pool.clone())),
            products: Arc::new(PgSource::<Product>::new(self.pool.clone())),
            product_line_items: Arc::new(PgSource::<ProductLineItem>::new(self.pool.clone())),
            storage_locations: Arc::new(PgSource::<StorageLocation>::new(self.pool.clone())),
            shopping_locations: Arc::new(PgSource::<ShoppingLocation>::new(self.pool.clone())),
            shopping_list_items: Arc::new(PgSource::<ShoppingListItem>::new(self.pool.clone())),
            activities: Arc::new(PgSource::<Activity>::new(self.pool.clone())),
        }
    }

    pub fn change_log(&self) -> Arc<PgChangeLog> {
        Arc::new(PgChangeLog::new(self.pool.clone()))
    }
}
