//! Larder Storage - Read Caches and Change-Log Reconciliation
//!
//! Every hot read path in Larder is served from a set of in-process caches,
//! one per entity domain. The caches are bulk loaded at startup and then kept
//! eventually consistent with the database by replaying the shared change log.
//!
//! The relational store itself lives behind [`EntitySource`] and
//! [`ChangeLogSource`]; the Postgres implementation is in `larder-server` and
//! [`InMemoryStore`] stands in for it in tests.

pub mod cache;
pub mod memory;

pub use cache::{
    CacheConfig, CacheCoordinator, CacheSources, CacheStats, CacheableEntity, ChangeLogSource,
    DomainCache, DomainCaches, EntitySource, InMemoryChangeLog, LoadWindow, OwnedEntity,
    PollOutcome, RefreshAction,
};
pub use memory::{InMemoryStore, InMemoryTable, SoftDelete};
