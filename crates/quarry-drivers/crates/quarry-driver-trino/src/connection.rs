//! HTTP statement-protocol session

use crate::protocol::{Column, HeaderDialect, QueryResults, decode_value};
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{
    ColumnMeta, Connection, ConnectionConfig, QuarryError, QueryResult, Result, Row,
    StatementResult, Value,
};
use reqwest::{RequestBuilder, Response};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use url::form_urlencoded;
use uuid::Uuid;

/// Session state the server may change through response headers
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Everything a statement produced once its last page has been read
struct Collected {
    query_id: String,
    columns: Vec<Column>,
    data: Vec<Vec<serde_json::Value>>,
    update_type: Option<String>,
    update_count: Option<u64>,
    warnings: Vec<String>,
}

/// A Trino/Presto session over HTTP
///
/// Timeouts live on the `reqwest::Client`, so they apply to every request
/// the session issues.
pub struct TrinoConnection {
    client: reqwest::Client,
    base_url: String,
    dialect: HeaderDialect,
    username: String,
    password: String,
    source: Option<String>,
    resource_group: Option<String>,
    session: Mutex<SessionState>,
    closed: AtomicBool,
}

impl TrinoConnection {
    pub(crate) fn new(
        client: reqwest::Client,
        dialect: HeaderDialect,
        config: &ConnectionConfig,
    ) -> Self {
        let session = SessionState {
            catalog: config.catalog.clone(),
            schema: config.schema.clone(),
            properties: BTreeMap::new(),
        };
        Self {
            client,
            base_url: format!(
                "{}://{}:{}",
                config.protocol.scheme(),
                config.host,
                config.port
            ),
            dialect,
            username: config.username.clone(),
            password: config.password.clone(),
            source: config.resolved_source(),
            resource_group: config.resource_group.clone(),
            session: Mutex::new(session),
            closed: AtomicBool::new(false),
        }
    }

    /// Current catalog, including changes made by `USE`
    pub fn catalog(&self) -> Option<String> {
        self.session.lock().catalog.clone()
    }

    /// Current schema, including changes made by `USE`
    pub fn schema(&self) -> Option<String> {
        self.session.lock().schema.clone()
    }

    /// Session properties that will be sent with the next statement
    pub fn session_properties(&self) -> BTreeMap<String, String> {
        self.session.lock().properties.clone()
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QuarryError::Connection("Connection is closed".to_string()));
        }
        Ok(())
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let session = self.session.lock().clone();
        let dialect = self.dialect;

        let mut request = request
            .basic_auth(&self.username, Some(&self.password))
            .header(dialect.header("User"), self.username.as_str());

        if let Some(source) = &self.source {
            request = request.header(dialect.header("Source"), source.as_str());
        }
        if let Some(group) = &self.resource_group {
            request = request.header(dialect.header("Client-Tags"), group.as_str());
        }
        if let Some(catalog) = &session.catalog {
            request = request.header(dialect.header("Catalog"), catalog.as_str());
        }
        if let Some(schema) = &session.schema {
            request = request.header(dialect.header("Schema"), schema.as_str());
        }
        if !session.properties.is_empty() {
            request = request.header(dialect.header("Session"), encode_session(&session.properties));
        }
        request
    }

    /// Apply `Set-*`/`Clear-*` response headers to the session
    fn absorb_session_headers(&self, response: &Response) {
        let headers = response.headers();
        let mut session = self.session.lock();

        for value in headers.get_all(self.dialect.header("Set-Session").as_str()) {
            let Ok(text) = value.to_str() else { continue };
            if let Some((name, value)) = form_urlencoded::parse(text.as_bytes()).next() {
                tracing::debug!(property = %name, "session property set by server");
                session.properties.insert(name.into_owned(), value.into_owned());
            }
        }
        for value in headers.get_all(self.dialect.header("Clear-Session").as_str()) {
            if let Ok(name) = value.to_str() {
                session.properties.remove(name.trim());
            }
        }
        if let Some(catalog) = headers
            .get(self.dialect.header("Set-Catalog").as_str())
            .and_then(|v| v.to_str().ok())
        {
            session.catalog = Some(catalog.to_string());
        }
        if let Some(schema) = headers
            .get(self.dialect.header("Set-Schema").as_str())
            .and_then(|v| v.to_str().ok())
        {
            session.schema = Some(schema.to_string());
        }
    }

    async fn read_page(&self, request: RequestBuilder) -> Result<QueryResults> {
        let response = self
            .with_headers(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        self.absorb_session_headers(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<QueryResults>(&body) {
                Ok(QueryResults { error: Some(err), .. }) => QuarryError::Query(err.to_string()),
                _ => QuarryError::Driver(format!(
                    "Server returned HTTP {}: {}",
                    status.as_u16(),
                    body.trim()
                )),
            });
        }

        let page = response
            .json::<QueryResults>()
            .await
            .map_err(|e| QuarryError::Driver(format!("Malformed statement response: {}", e)))?;

        if let Some(err) = &page.error {
            return Err(QuarryError::Query(err.to_string()));
        }
        Ok(page)
    }

    /// Submit a statement and drain every page
    async fn run_statement(&self, sql: &str) -> Result<Collected> {
        self.ensure_not_closed()?;

        let url = format!("{}/v1/statement", self.base_url);
        let mut page = self
            .read_page(self.client.post(url).body(sql.to_string()))
            .await?;

        let mut collected = Collected {
            query_id: page.id.clone(),
            columns: Vec::new(),
            data: Vec::new(),
            update_type: None,
            update_count: None,
            warnings: Vec::new(),
        };

        loop {
            if collected.columns.is_empty() {
                if let Some(columns) = page.columns.take() {
                    collected.columns = columns;
                }
            }
            if let Some(data) = page.data.take() {
                collected.data.extend(data);
            }
            if page.update_type.is_some() {
                collected.update_type = page.update_type.take();
            }
            if page.update_count.is_some() {
                collected.update_count = page.update_count;
            }
            collected
                .warnings
                .extend(page.warnings.drain(..).map(|w| w.message));

            let Some(next) = page.next_uri.take() else {
                break;
            };
            page = self.read_page(self.client.get(next)).await?;
        }

        Ok(collected)
    }

    fn into_query_result(collected: Collected, execution_time_ms: u64) -> QueryResult {
        let columns: Vec<ColumnMeta> = collected
            .columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| ColumnMeta {
                name: column.name.clone(),
                data_type: column.type_signature.clone(),
                nullable: true,
                ordinal,
            })
            .collect();
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let rows = collected
            .data
            .iter()
            .map(|cells| {
                let values: Vec<Value> = collected
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        cells
                            .get(idx)
                            .map(|cell| decode_value(&column.type_signature, cell))
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Row::new(names.clone(), values)
            })
            .collect();

        QueryResult {
            id: Uuid::new_v4(),
            query_id: Some(collected.query_id),
            columns,
            rows,
            affected_rows: collected.update_count.unwrap_or(0),
            execution_time_ms,
            warnings: collected.warnings,
        }
    }
}

#[async_trait]
impl Connection for TrinoConnection {
    fn driver_name(&self) -> &str {
        match self.dialect {
            HeaderDialect::Trino => "trino",
            HeaderDialect::Presto => "presto",
        }
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        let start = Instant::now();
        let collected = self.run_statement(sql).await?;
        let update_type = collected.update_type.clone();
        let affected_rows = collected.update_count.unwrap_or(0);
        let is_query = !collected.columns.is_empty() && update_type.is_none();

        tracing::debug!(
            update_type = update_type.as_deref(),
            duration_ms = start.elapsed().as_millis() as u64,
            "execute completed"
        );

        Ok(StatementResult {
            is_query,
            result: is_query
                .then(|| Self::into_query_result(collected, start.elapsed().as_millis() as u64)),
            affected_rows,
            update_type,
        })
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let collected = self.run_statement(sql).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        let result = Self::into_query_result(collected, execution_time_ms);

        tracing::debug!(
            query_id = result.query_id.as_deref(),
            row_count = result.rows.len(),
            duration_ms = execution_time_ms,
            "query completed"
        );
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(base_url = %self.base_url, "trino connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TrinoConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrinoConnection")
            .field("base_url", &self.base_url)
            .field("dialect", &self.dialect)
            .field("username", &self.username)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// `name=value,name=value` with URL-encoded values
pub(crate) fn encode_session(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(name, value)| {
            let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
            format!("{}={}", name, encoded)
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> QuarryError {
    if err.is_timeout() {
        QuarryError::Timeout(format!("request timed out: {}", err))
    } else if err.is_connect() {
        QuarryError::Connection(format!("failed to connect: {}", err))
    } else {
        QuarryError::Driver(format!("HTTP transport error: {}", err))
    }
}
