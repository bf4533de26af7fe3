//! Trino driver for Quarry
//!
//! Trino (formerly PrestoSQL) is a distributed SQL query engine. Clients talk
//! to the coordinator over HTTP: a statement is POSTed to `/v1/statement` and
//! results are paged by following `nextUri` links. The same driver speaks the
//! legacy Presto header dialect.

mod connection;
mod driver;
#[cfg(test)]
mod driver_tests;
mod protocol;

pub use connection::TrinoConnection;
pub use driver::*;
pub use protocol::{HeaderDialect, decode_value};
