use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use quarry_connection::{HealthStatus, PoolStats};

/// Rows returned by `execute-query`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub data: Vec<Vec<JsonValue>>,
    /// Rows in `data`, after the limit was applied
    pub row_count: usize,
}

/// Tables of one schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableList {
    pub tables: Vec<String>,
    pub schema: String,
}

/// `DESCRIBE` output, one object per column keyed by the result's column names
/// (`Column`, `Type`, `Extra`, `Comment`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub columns: Vec<Map<String, JsonValue>>,
    pub table: String,
    pub schema: String,
}

/// Outcome of the `health-check` tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub schema: String,
    pub pool: PoolStats,
}
