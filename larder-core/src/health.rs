//! Health check types
//!
//! Used by the cache coordinator to report whether the caches are warm and
//! whether the change feed is making progress.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a service or component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
    /// Health status is unknown (e.g., not yet started)
    Unknown,
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    pub message: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    fn with_status(
        status: HealthStatus,
        component: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            component: component.into(),
            message,
            metadata: None,
        }
    }

    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component, None)
    }

    /// Create a degraded check result.
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component, Some(message.into()))
    }

    /// Create an unhealthy check result.
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component, Some(message.into()))
    }

    /// Create an unknown check result.
    pub fn unknown(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unknown, component, Some(message.into()))
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_constructors() {
        assert!(HealthCheck::healthy("cache").is_healthy());

        let degraded = HealthCheck::degraded("cache", "stuck at 17");
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.message.as_deref(), Some("stuck at 17"));
    }

    #[test]
    fn test_health_metadata() {
        let check = HealthCheck::healthy("cache").with_metadata("cursor", serde_json::json!(12));
        let metadata = check.metadata.expect("metadata should be set");
        assert_eq!(metadata.get("cursor"), Some(&serde_json::json!(12)));
    }
}
