//! Tool catalogue and argument dispatch
//!
//! Every tool is read-only and maps onto one [`QueryService`] operation.
//! Arguments arrive either as a bare object or wrapped as
//! `{"params": {...}}`; both forms are accepted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::error::{ServiceError, ServiceResult};
use crate::query_service::QueryService;

pub const EXECUTE_QUERY: &str = "execute-query";
pub const LIST_TABLES: &str = "list-tables";
pub const DESCRIBE_TABLE: &str = "describe-table";
pub const HEALTH_CHECK: &str = "health-check";

/// A tool as advertised to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: JsonValue,
    pub annotations: ToolAnnotations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub title: &'static str,
    pub read_only_hint: bool,
}

fn tool(name: &'static str, title: &'static str, input_schema: JsonValue) -> ToolDefinition {
    ToolDefinition {
        name,
        description: title,
        input_schema,
        annotations: ToolAnnotations {
            title,
            read_only_hint: true,
        },
    }
}

/// All tools, in the order they are listed
pub fn catalogue() -> Vec<ToolDefinition> {
    vec![
        tool(
            EXECUTE_QUERY,
            "Execute SQL Query",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "SQL statement to run"},
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum rows to return (default 2000, 0 for all)"
                    }
                },
                "required": ["query"]
            }),
        ),
        tool(
            LIST_TABLES,
            "List Database Tables",
            json!({
                "type": "object",
                "properties": {
                    "schema": {"type": "string", "description": "Schema to list, optionally catalog-qualified"}
                }
            }),
        ),
        tool(
            DESCRIBE_TABLE,
            "Describe Table Structure",
            json!({
                "type": "object",
                "properties": {
                    "schema": {"type": "string"},
                    "table": {"type": "string"}
                },
                "required": ["table"]
            }),
        ),
        tool(
            HEALTH_CHECK,
            "Health Check",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct ExecuteQueryArgs {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ListTablesArgs {
    schema: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeTableArgs {
    schema: Option<String>,
    table: String,
}

/// Run tool `name` with `arguments` and return its JSON payload
#[tracing::instrument(skip(service, arguments))]
pub async fn dispatch(service: &QueryService, name: &str, arguments: JsonValue) -> ServiceResult<JsonValue> {
    match name {
        EXECUTE_QUERY => {
            let args: ExecuteQueryArgs = parse(arguments)?;
            to_json(service.execute_query(&args.query, args.limit).await?)
        }
        LIST_TABLES => {
            let args: ListTablesArgs = parse(arguments)?;
            to_json(service.list_tables(args.schema.as_deref()).await?)
        }
        DESCRIBE_TABLE => {
            let args: DescribeTableArgs = parse(arguments)?;
            to_json(service.describe_table(args.schema.as_deref(), &args.table).await?)
        }
        HEALTH_CHECK => to_json(service.health_check().await),
        other => Err(ServiceError::UnknownTool(other.to_string())),
    }
}

fn parse<T: DeserializeOwned>(arguments: JsonValue) -> ServiceResult<T> {
    let arguments = match arguments {
        JsonValue::Null => json!({}),
        JsonValue::Object(mut map) if map.len() == 1 && map.get("params").is_some_and(JsonValue::is_object) => {
            map.remove("params").unwrap_or_else(|| json!({}))
        }
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ServiceError::InvalidArgument(e.to_string()))
}

fn to_json<T: Serialize>(value: T) -> ServiceResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| ServiceError::QueryFailed(format!("unserializable result: {}", e)))
}
