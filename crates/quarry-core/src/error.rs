//! Error types for Quarry

use std::time::Duration;

use thiserror::Error;

/// Core error type for Quarry operations
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cannot reach {address} after {:.2}s: {source}", elapsed.as_secs_f64())]
    Connectivity {
        address: String,
        elapsed: Duration,
        #[source]
        source: std::io::Error,
    },

    #[error("Liveness check failed: {0}")]
    Liveness(String),

    #[error("Connection pool exhausted (max connections: {max_connections})")]
    PoolExhausted { max_connections: usize },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Failed to create connection: {0}")]
    Creation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl QuarryError {
    /// Whether the failure comes from pool capacity rather than the engine.
    ///
    /// Callers can retry these after a backoff.
    pub fn is_pool_unavailable(&self) -> bool {
        matches!(
            self,
            QuarryError::PoolExhausted { .. } | QuarryError::PoolClosed | QuarryError::Timeout(_)
        )
    }
}

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;
