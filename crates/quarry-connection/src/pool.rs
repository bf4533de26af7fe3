//! Connection pooling for engine sessions
//!
//! The pool hands out at most `max_size` live connections, reuses the most
//! recently released one first, and runs a background maintenance loop that
//! reaps stale entries, probes the rest and tops the pool back up to
//! `min_size`.
//!
//! # Example
//!
//! ```ignore
//! use quarry_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_acquire_timeout_ms(5000)
//!     .with_idle_timeout_ms(600_000);
//!
//! let pool = ConnectionPool::new(config, connection_factory).await;
//! let conn = pool.acquire().await?;
//! let rows = conn.query("SELECT 1").await?;
//! pool.release(conn).await;
//! pool.shutdown().await;
//! ```

mod config;
mod entry;
mod maintenance;
#[allow(clippy::module_inception)]
mod pool;
mod stats;


pub use config::{PoolConfig, ProbePolicy};
pub use entry::ConnectionId;
pub use maintenance::SweepReport;
pub use pool::{ConnectionPool, PooledConnection};
pub use stats::PoolStats;
