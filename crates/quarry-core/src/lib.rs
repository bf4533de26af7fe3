//! Quarry Core - Core abstractions and traits for the query broker
//!
//! This crate provides the fundamental traits and types that all other
//! Quarry crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for query-engine driver implementations
//! - `Connection` - Trait for engine connections
//! - `ConnectionConfig` - Everything needed to open a session
//! - Common types like `Value`, `Row`, `QueryResult`, etc.

mod connection;
mod driver;
mod error;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
