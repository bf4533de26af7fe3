//! Connection trait

use crate::{QueryResult, Result, StatementResult};
use async_trait::async_trait;

/// A session with the query engine
///
/// Implementations are not expected to run two statements at once; the
/// pool guarantees a single logical owner per connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "trino", "presto")
    fn driver_name(&self) -> &str;

    /// Execute a statement that does not produce rows (SET SESSION, INSERT, ...)
    async fn execute(&self, sql: &str) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Close the connection
    ///
    /// Closing twice is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
