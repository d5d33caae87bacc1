//! Background Jobs for the Larder server
//!
//! - `change_poller`: replays the change log into the domain caches
//!
//! # Usage
//!
//! Spawned after the cache coordinator has started:
//!
//! ```ignore
//! use larder_server::jobs::change_poller_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(change_poller_task(coordinator.clone(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

pub mod change_poller;

pub use change_poller::{change_poller_task, PollerMetrics, PollerSnapshot};
