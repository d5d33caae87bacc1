//! Read caches with change-log reconciliation.
//!
//! # Layout
//!
//! - [`DomainCache<T>`]: one concurrent id -> entity map plus an
//!   `initialized` flag. Serves point, batch and filtered lookups, falling
//!   back to the database whenever it cannot answer authoritatively.
//! - [`DomainCaches`]: the eight domain caches and the table-name dispatch
//!   used to route change-log rows to the right refresh handler.
//! - [`CacheCoordinator`]: owns the single poll cursor. Computes it at
//!   startup, bulk loads every cache, then replays the change log one batch
//!   per call to [`CacheCoordinator::poll_once`].
//!
//! # Consistency
//!
//! Reads are eventually consistent. A cache entry reflects the last
//! successfully processed refresh for its id; staleness is bounded by the
//! poll interval plus processing latency. The cursor only moves past a
//! change-log id once that id's refresh has succeeded.
//!
//! # Example
//!
//! ```ignore
//! let caches = Arc::new(DomainCaches::new(store.sources()));
//! let coordinator = CacheCoordinator::new(caches.clone(), change_log, CacheConfig::from_env());
//! coordinator.start().await?; // fatal on error
//!
//! let family = caches.family_by_share_code("K7Q2XZ").await?;
//! let shelves = caches.storage_locations().get_all_for_owner(family_id).await?;
//! ```

pub mod change_log;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod registry;
pub mod traits;

pub use change_log::{ChangeLogSource, InMemoryChangeLog};
pub use config::CacheConfig;
pub use coordinator::{CacheCoordinator, PollOutcome};
pub use domain::{DomainCache, RefreshAction};
pub use registry::{CacheSources, DomainCaches};
pub use traits::{CacheStats, CacheableEntity, EntitySource, LoadWindow, OwnedEntity};
