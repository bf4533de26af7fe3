//! Health status classification

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Health of the engine as seen through the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probe answered within the healthy threshold
    Healthy,
    /// Probe answered, but slowly
    Degraded,
    /// Probe failed, answered too slowly, or no connection was available
    Unhealthy,
}

impl HealthStatus {
    /// Classify a probe latency with [`HealthThresholds::default`]
    /// (healthy up to 100ms, degraded up to 500ms).
    ///
    /// ```
    /// use quarry_connection::health::HealthStatus;
    /// use std::time::Duration;
    ///
    /// assert_eq!(HealthStatus::from_latency(Duration::from_millis(40)), HealthStatus::Healthy);
    /// assert_eq!(HealthStatus::from_latency(Duration::from_millis(250)), HealthStatus::Degraded);
    /// assert_eq!(HealthStatus::from_latency(Duration::from_secs(2)), HealthStatus::Unhealthy);
    /// ```
    pub fn from_latency(latency: Duration) -> Self {
        HealthThresholds::default().classify(latency)
    }

    /// Healthy and degraded engines still serve queries
    pub fn is_usable(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency bounds for [`HealthStatus`] classification (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub healthy: Duration,
    pub degraded: Duration,
}

impl HealthThresholds {
    /// `degraded_ms` is raised to `healthy_ms` if it is smaller
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy: Duration::from_millis(healthy_ms),
            degraded: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }

    pub fn classify(&self, latency: Duration) -> HealthStatus {
        if latency <= self.healthy {
            HealthStatus::Healthy
        } else if latency <= self.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::new(100, 500)
    }
}
