//! Quarry Connection - connection creation, health probes and pooling
//!
//! This crate owns the lifecycle of engine sessions: the factory that opens
//! and verifies them, the pool that shares them across request handlers, and
//! the background loop that keeps the pool warm.

mod factory;
pub mod health;
pub mod pool;

#[cfg(test)]
mod test_support;

pub use factory::{ConnectionFactory, EngineConnectionFactory};
pub use health::{HealthStatus, HealthThresholds, check_liveness, probe_reachability};
pub use pool::{
    ConnectionId, ConnectionPool, PoolConfig, PoolStats, PooledConnection, ProbePolicy,
    SweepReport,
};
