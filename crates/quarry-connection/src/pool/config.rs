//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When the maintenance loop probes idle connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePolicy {
    /// Probe every idle connection on every sweep
    #[default]
    Always,
    /// Stop probing once the pool has proven healthy; resume after a failure
    UntilHealthy,
}

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and the maintenance schedule. Durations
/// are stored in milliseconds so the struct serializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connections the maintenance loop keeps open
    min_size: usize,
    /// Hard cap on live connections (idle + in use + being opened)
    max_size: usize,
    /// How long `acquire` waits at capacity; `None` fails immediately
    #[serde(default)]
    acquire_timeout_ms: Option<u64>,
    /// Idle time after which a connection is reaped
    idle_timeout_ms: u64,
    /// Age after which a connection is recycled regardless of use
    #[serde(default)]
    max_lifetime_ms: Option<u64>,
    /// Period of the maintenance loop
    validate_interval_ms: u64,
    /// How long `shutdown` waits for the maintenance loop before aborting it
    shutdown_timeout_ms: u64,
    #[serde(default)]
    probe_policy: ProbePolicy,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: None,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: None,
            validate_interval_ms: 30_000,
            shutdown_timeout_ms: 1_000,
            probe_policy: ProbePolicy::Always,
        }
    }

    /// Block up to `timeout_ms` in `acquire` when the pool is at capacity
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    pub fn with_validate_interval_ms(mut self, interval_ms: u64) -> Self {
        self.validate_interval_ms = interval_ms.max(1);
        self
    }

    pub fn with_shutdown_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = timeout_ms;
        self
    }

    pub fn with_probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe_policy = policy;
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout, if blocking acquisition is enabled
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the maximum lifetime as a Duration if set
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn validate_interval(&self) -> Duration {
        Duration::from_millis(self.validate_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn probe_policy(&self) -> ProbePolicy {
        self.probe_policy
    }
}

impl Default for PoolConfig {
    /// Defaults: 2..=10 connections, no acquire wait, 10 minute idle
    /// timeout, 30 second sweep, 1 second shutdown grace.
    fn default() -> Self {
        Self::new(2, 10)
    }
}
