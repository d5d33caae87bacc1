//! Cache configuration.
//!
//! Loaded from environment variables with development-friendly defaults.

use crate::cache::traits::LoadWindow;
use chrono::{Duration as ChronoDuration, Utc};
use larder_core::{ConfigError, Timestamp};
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Default change-log poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default bulk-load window for the activities cache, in days.
pub const DEFAULT_ACTIVITY_WINDOW_DAYS: u64 = 30;

/// Consecutive failed cycles on one change-log entry before it is logged at
/// ERROR instead of WARN (one minute at the default interval).
pub const DEFAULT_STUCK_ALERT_AFTER: u64 = 12;

/// Configuration for the domain caches and the change poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How often the change log is polled.
    pub poll_interval: Duration,
    /// How far back the activities cache is loaded at startup.
    pub activity_window: Duration,
    /// Failed cycles on the same entry before escalating the log level.
    pub stuck_alert_after: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            activity_window: Duration::from_secs(DEFAULT_ACTIVITY_WINDOW_DAYS * SECS_PER_DAY),
            stuck_alert_after: DEFAULT_STUCK_ALERT_AFTER,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `LARDER_CACHE_POLL_INTERVAL_SECS`: Change-log poll interval (default: 5)
    /// - `LARDER_CACHE_ACTIVITY_WINDOW_DAYS`: Activities bulk-load window (default: 30)
    /// - `LARDER_CACHE_STUCK_ALERT_AFTER`: Failed cycles before ERROR logging (default: 12)
    pub fn from_env() -> Self {
        let poll_interval = Duration::from_secs(
            std::env::var("LARDER_CACHE_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );

        let window_days: u64 = std::env::var("LARDER_CACHE_ACTIVITY_WINDOW_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ACTIVITY_WINDOW_DAYS);

        let stuck_alert_after = std::env::var("LARDER_CACHE_STUCK_ALERT_AFTER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_STUCK_ALERT_AFTER);

        // Out-of-range day counts become Duration::MAX, which validate() rejects
        let activity_window = window_days
            .checked_mul(SECS_PER_DAY)
            .map(Duration::from_secs)
            .unwrap_or(Duration::MAX);

        Self {
            poll_interval,
            activity_window,
            stuck_alert_after,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the activities bulk-load window.
    pub fn with_activity_window(mut self, window: Duration) -> Self {
        self.activity_window = window;
        self
    }

    /// Set the stuck-entry alert threshold.
    pub fn with_stuck_alert_after(mut self, cycles: u64) -> Self {
        self.stuck_alert_after = cycles;
        self
    }

    /// Reject values the poller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.window_start(Utc::now()).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "activity_window".to_string(),
                value: format!("{:?}", self.activity_window),
                reason: "out of range".to_string(),
            });
        }
        if self.stuck_alert_after == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stuck_alert_after".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Bulk-load window for the activities cache, anchored at now.
    ///
    /// A window reaching past the earliest representable instant covers every
    /// row, so it loads the whole table.
    pub fn activity_load_window(&self) -> LoadWindow {
        match self.window_start(Utc::now()) {
            Some(start) => LoadWindow::Since(start),
            None => LoadWindow::All,
        }
    }

    fn window_start(&self, now: Timestamp) -> Option<Timestamp> {
        let window = ChronoDuration::from_std(self.activity_window).ok()?;
        now.checked_sub_signed(window)
    }
}
