//! Quarry Drivers - query-engine driver implementations
//!
//! This crate collects the concrete implementations of the driver traits
//! defined in `quarry-core` behind cargo features.

#[cfg(feature = "trino")]
pub use quarry_driver_trino as trino;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from quarry-core
pub use quarry_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, Protocol, QuarryError, QueryResult,
    Result, Row, StatementResult, Value,
};
