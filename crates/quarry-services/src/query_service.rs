//! Pooled statement execution
//!
//! Each operation borrows one connection, runs exactly one statement on it
//! and hands it back to the pool whether the statement succeeded or not.

use std::time::Instant;

use quarry_connection::{ConnectionPool, HealthStatus, HealthThresholds, check_liveness};
use quarry_core::{QueryResult, Value};
use serde_json::{Map, Value as JsonValue};

use crate::error::{ServiceError, ServiceResult};
use crate::view_models::{HealthSummary, QueryOutput, TableDescription, TableList};

/// Rows returned by [`QueryService::execute_query`] when no limit is given
pub const DEFAULT_ROW_LIMIT: usize = 2000;

/// Service for running statements against the engine
pub struct QueryService {
    pool: ConnectionPool,
    default_schema: String,
    thresholds: HealthThresholds,
}

impl QueryService {
    /// Create a service over `pool`; `default_schema` is used whenever a
    /// request does not name one
    pub fn new(pool: ConnectionPool, default_schema: impl Into<String>) -> Self {
        Self {
            pool,
            default_schema: default_schema.into(),
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Run `sql` and return at most `limit` rows.
    ///
    /// `None` means [`DEFAULT_ROW_LIMIT`]; `Some(0)` returns every row.
    #[tracing::instrument(skip(self, sql))]
    pub async fn execute_query(&self, sql: &str, limit: Option<usize>) -> ServiceResult<QueryOutput> {
        if sql.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("Query is required".into()));
        }

        let result = self.run(sql).await?;
        let limit = match limit.unwrap_or(DEFAULT_ROW_LIMIT) {
            0 => usize::MAX,
            n => n,
        };

        let columns = result.column_names();
        let data: Vec<Vec<JsonValue>> = result
            .rows
            .iter()
            .take(limit)
            .map(|row| row.values.iter().map(Value::to_json).collect())
            .collect();
        if data.len() < result.row_count() {
            tracing::debug!(returned = data.len(), total = result.row_count(), "result truncated");
        }

        Ok(QueryOutput {
            row_count: data.len(),
            columns,
            data,
        })
    }

    /// `SHOW TABLES FROM <schema>`
    #[tracing::instrument(skip(self))]
    pub async fn list_tables(&self, schema: Option<&str>) -> ServiceResult<TableList> {
        let schema = self.resolve_schema(schema)?;
        let result = self.run(&format!("SHOW TABLES FROM {}", schema)).await?;

        let tables = result
            .rows
            .iter()
            .filter_map(|row| row.get(0))
            .map(|value| match value.as_str() {
                Some(name) => name.to_string(),
                None => value.to_string(),
            })
            .collect();

        Ok(TableList { tables, schema })
    }

    /// `DESCRIBE <schema>.<table>`
    #[tracing::instrument(skip(self))]
    pub async fn describe_table(&self, schema: Option<&str>, table: &str) -> ServiceResult<TableDescription> {
        if table.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("Table name is required".into()));
        }
        let schema = self.resolve_schema(schema)?;
        validate_identifier(table, false)?;

        let result = self.run(&format!("DESCRIBE {}.{}", schema, table)).await?;
        Ok(TableDescription {
            columns: records(&result),
            table: table.to_string(),
            schema,
        })
    }

    /// Pool statistics plus a timed liveness probe on a pooled connection.
    ///
    /// Never blocks for capacity: an exhausted pool reports `unhealthy`.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> HealthSummary {
        let pool = self.pool.stats();
        let summary = |status: HealthStatus, latency_ms: Option<f64>, error: Option<String>| HealthSummary {
            status,
            latency_ms,
            error,
            schema: self.default_schema.clone(),
            pool,
        };

        let conn = match self.pool.try_acquire().await {
            Ok(conn) => conn,
            Err(e) => return summary(HealthStatus::Unhealthy, None, Some(e.to_string())),
        };

        let start = Instant::now();
        let outcome = check_liveness(&*conn).await;
        let latency = start.elapsed();
        self.pool.release(conn).await;

        match outcome {
            Ok(_) => {
                let status = self.thresholds.classify(latency);
                tracing::debug!(%status, ?latency, "health probe finished");
                summary(status, Some(latency.as_secs_f64() * 1000.0), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "health probe failed");
                summary(HealthStatus::Unhealthy, None, Some(e.to_string()))
            }
        }
    }

    async fn run(&self, sql: &str) -> ServiceResult<QueryResult> {
        let conn = self.pool.acquire().await?;
        let result = conn.query(sql).await;
        self.pool.release(conn).await;

        result.map_err(|e| {
            tracing::warn!(error = %e, "statement failed");
            ServiceError::from(e)
        })
    }

    fn resolve_schema(&self, schema: Option<&str>) -> ServiceResult<String> {
        let schema = match schema {
            Some(s) if !s.trim().is_empty() => s,
            _ => self.default_schema.as_str(),
        };
        validate_identifier(schema, true)?;
        Ok(schema.to_string())
    }
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z0-9_]` segments
/// are accepted; schemas may be qualified as `catalog.schema`.
fn validate_identifier(name: &str, allow_catalog: bool) -> ServiceResult<()> {
    let segments: Vec<&str> = name.split('.').collect();
    let max_segments = if allow_catalog { 2 } else { 1 };

    let valid = segments.len() <= max_segments
        && segments.iter().all(|segment| {
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument(format!("invalid identifier: {:?}", name)))
    }
}

fn records(result: &QueryResult) -> Vec<Map<String, JsonValue>> {
    let names = result.column_names();
    result
        .rows
        .iter()
        .map(|row| {
            names
                .iter()
                .cloned()
                .zip(row.values.iter().map(Value::to_json))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedFactory, service};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("sales_2024", false).is_ok());
        assert!(validate_identifier("hive.sales", true).is_ok());
        assert!(validate_identifier("hive.sales", false).is_err());
        assert!(validate_identifier("a.b.c", true).is_err());
        assert!(validate_identifier("orders; DROP TABLE x", false).is_err());
        assert!(validate_identifier("hive.", true).is_err());
        assert!(validate_identifier("", false).is_err());
    }

    #[tokio::test]
    async fn test_execute_query_applies_default_limit() {
        let factory = ScriptedFactory::with_rows(2500);
        let service = service(&factory).await;

        let output = service.execute_query("SELECT n FROM numbers", None).await.expect("query");
        assert_eq!(output.row_count, DEFAULT_ROW_LIMIT);
        assert_eq!(output.data.len(), DEFAULT_ROW_LIMIT);
        assert_eq!(output.columns, vec!["n".to_string()]);
        assert_eq!(output.data[0], vec![json!(0)]);
    }

    #[tokio::test]
    async fn test_execute_query_limits() {
        let factory = ScriptedFactory::with_rows(5);
        let service = service(&factory).await;

        let output = service.execute_query("SELECT n FROM numbers", Some(3)).await.expect("query");
        assert_eq!(output.row_count, 3);

        let output = service.execute_query("SELECT n FROM numbers", Some(0)).await.expect("query");
        assert_eq!(output.row_count, 5);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_a_connection() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;

        let err = service.execute_query("  ", None).await.expect_err("empty query");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        assert!(factory.statements().is_empty());
    }

    #[tokio::test]
    async fn test_connection_released_after_failure() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;
        factory.fail_queries(true);

        let err = service.execute_query("SELECT broken", None).await.expect_err("fails");
        assert!(matches!(err, ServiceError::QueryFailed(_)));

        let stats = service.pool().stats();
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.idle(), stats.total());
    }

    #[tokio::test]
    async fn test_list_tables_uses_default_schema() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;

        let list = service.list_tables(None).await.expect("list");
        assert_eq!(list.schema, "default");
        assert_eq!(list.tables, vec!["orders".to_string(), "customers".to_string()]);
        assert_eq!(factory.statements().last().map(String::as_str), Some("SHOW TABLES FROM default"));

        service.list_tables(Some("hive.sales")).await.expect("list");
        assert_eq!(factory.statements().last().map(String::as_str), Some("SHOW TABLES FROM hive.sales"));
    }

    #[tokio::test]
    async fn test_describe_table_returns_records() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;

        let description = service.describe_table(Some("sales"), "orders").await.expect("describe");
        assert_eq!(factory.statements().last().map(String::as_str), Some("DESCRIBE sales.orders"));
        assert_eq!(description.table, "orders");
        assert_eq!(
            serde_json::to_value(&description.columns).expect("serialize"),
            json!([
                {"Column": "id", "Type": "bigint", "Extra": "", "Comment": ""},
                {"Column": "total", "Type": "decimal(10,2)", "Extra": "", "Comment": "gross"}
            ])
        );
    }

    #[tokio::test]
    async fn test_describe_rejects_unsafe_identifiers() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;

        let err = service.describe_table(None, "orders--").await.expect_err("invalid");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
        let err = service.describe_table(None, "").await.expect_err("missing");
        assert!(matches!(err, ServiceError::InvalidArgument(ref m) if m.contains("required")));
        assert!(factory.statements().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_reports_pool_and_probe() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;

        let health = service.health_check().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.latency_ms.is_some());
        assert_eq!(health.schema, "default");
        assert_eq!(service.pool().stats().active(), 0);

        factory.fail_queries(true);
        let health = service.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn test_health_check_on_closed_pool() {
        let factory = ScriptedFactory::with_rows(1);
        let service = service(&factory).await;
        service.pool().shutdown().await;

        let health = service.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.latency_ms.is_none());
    }
}
