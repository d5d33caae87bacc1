//! Larder Server
//!
//! Hosts the process-wide domain caches against PostgreSQL: builds the
//! connection pool, bulk loads every cache, and keeps them reconciled with
//! the change log from a background task until shutdown.

pub mod db;
pub mod jobs;
pub mod pg_entities;
pub mod telemetry;

pub use db::{DbConfig, PgChangeLog, PgSource, PgStore};
pub use jobs::{change_poller_task, PollerMetrics, PollerSnapshot};
pub use pg_entities::PgEntity;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
