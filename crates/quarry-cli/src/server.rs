//! Newline-delimited JSON-RPC tool server
//!
//! Each request runs in its own task; a single writer task owns the output
//! stream so responses never interleave. The server stops reading on EOF or
//! when the shutdown future resolves, then waits for in-flight requests.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use quarry_services::{QueryService, ServiceError, catalogue, dispatch};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::rpc::{
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, Request, Response, RpcError,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "quarry";

/// The single resource the server exposes: the engine and its default schema
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub host: String,
    pub port: u16,
    pub schema: String,
}

impl ResourceInfo {
    pub fn uri(&self) -> String {
        format!("trino://{}:{}/{}", self.host, self.port, self.schema)
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

/// Routes JSON-RPC methods to the query service
pub struct Handler {
    service: QueryService,
    resource: ResourceInfo,
}

impl Handler {
    pub fn new(service: QueryService, resource: ResourceInfo) -> Self {
        Self { service, resource }
    }

    /// Handle one input line; `None` for notifications
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message");
                return Some(Response::failure(
                    Value::Null,
                    RpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };

        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let request: Request = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Some(Response::failure(
                    id,
                    RpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
                ));
            }
        };
        if request.jsonrpc != "2.0" {
            return Some(Response::failure(
                id,
                RpcError::new(INVALID_REQUEST, "Invalid request: jsonrpc must be \"2.0\""),
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let result = self.handle_request(&request).await;
        let id = request.id.unwrap_or(Value::Null);
        Some(match result {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        })
    }

    fn handle_notification(&self, request: &Request) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::info!("client initialized"),
            other => tracing::debug!(method = other, "ignoring notification"),
        }
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method, id = ?request.id))]
    async fn handle_request(&self, request: &Request) -> Result<Value, RpcError> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {"listChanged": false},
                    "resources": {"subscribe": false, "listChanged": false}
                },
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": catalogue()})),
            "tools/call" => {
                let params: ToolCallParams = parse_params(request)?;
                self.call_tool(params).await
            }
            "resources/list" => Ok(json!({
                "resources": [{
                    "uri": self.resource.uri(),
                    "name": format!("Trino Database ({})", self.resource.schema),
                    "description": "Trino SQL database connection",
                    "mimeType": "application/json"
                }]
            })),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(request)?;
                self.read_resource(&params.uri)
            }
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    async fn call_tool(&self, params: ToolCallParams) -> Result<Value, RpcError> {
        match dispatch(&self.service, &params.name, params.arguments).await {
            Ok(payload) => Ok(json!({
                "content": [{"type": "text", "text": payload.to_string()}],
                "structuredContent": payload,
                "isError": false
            })),
            Err(ServiceError::UnknownTool(name)) => {
                Err(RpcError::invalid_params(format!("Unknown tool: {}", name)))
            }
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, retryable = e.is_retryable(), "tool call failed");
                Ok(json!({
                    "content": [{"type": "text", "text": e.to_string()}],
                    "isError": true
                }))
            }
        }
    }

    fn read_resource(&self, uri: &str) -> Result<Value, RpcError> {
        if uri != self.resource.uri() {
            return Err(RpcError::invalid_params(format!("Unknown resource: {}", uri)));
        }
        let body = json!({
            "host": self.resource.host,
            "port": self.resource.port,
            "schema": self.resource.schema
        });
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": body.to_string()
            }]
        }))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, RpcError> {
    let value = request.params.clone().unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

/// Stdio server loop
pub struct Server {
    handler: Arc<Handler>,
}

impl Server {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Serve until `reader` reaches EOF or `shutdown` resolves
    pub async fn run<R, W, S>(self, reader: R, mut writer: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel::<Response>(64);
        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
                writer.flush().await?;
            }
            anyhow::Ok(())
        });

        let mut lines = reader.lines();
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer reading requests");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "request handler panicked");
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let handler = self.handler.clone();
                        let tx = tx.clone();
                        in_flight.spawn(async move {
                            if let Some(response) = handler.handle_line(&line).await {
                                let _ = tx.send(response).await;
                            }
                        });
                    }
                    Ok(None) => {
                        tracing::info!("input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to read input");
                        break;
                    }
                },
            }
        }

        let pending = in_flight.len();
        if pending > 0 {
            tracing::debug!(pending, "waiting for in-flight requests");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "request handler panicked");
            }
        }

        drop(tx);
        writer_task
            .await
            .context("response writer panicked")?
            .context("failed to write response")
    }
}
