//! Query-engine driver trait and connection configuration

use crate::{Connection, QuarryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Core driver trait that all query-engine drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "trino", "presto")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Registry name
    fn name(&self) -> &'static str;

    /// Display name for logs and tool descriptions
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Driver version
    fn version(&self) -> &'static str {
        "0.1.0"
    }

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Open a session with the engine.
    ///
    /// Implementations apply `connect_timeout` and `query_timeout` to every
    /// request issued over the returned connection.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Build a display URL for the configuration (never includes the password)
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Transport protocol used to reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// URL scheme for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(QuarryError::Configuration(format!(
                "unknown protocol '{}', expected http or https",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Connection configuration
///
/// Timeouts are first-class fields; drivers hand them to their client
/// builder so they govern every request of the session.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "trino", "presto")
    pub driver: String,
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Transport protocol
    pub protocol: Protocol,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Default catalog
    pub catalog: Option<String>,
    /// Default schema
    pub schema: Option<String>,
    /// Client source identifier; `{username}` is replaced with the username
    pub source: Option<String>,
    /// Resource group (queue) requested for every query
    pub resource_group: Option<String>,
    /// Session properties applied after connecting
    pub session_properties: BTreeMap<String, String>,
    /// Timeout for establishing transport connections
    pub connect_timeout: Duration,
    /// Timeout for each request issued over the session
    pub query_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str, host: &str, port: u16) -> Self {
        Self {
            driver: driver.to_string(),
            host: host.to_string(),
            port,
            protocol: Protocol::Https,
            username: String::new(),
            password: String::new(),
            catalog: None,
            schema: None,
            source: None,
            resource_group: None,
            session_properties: BTreeMap::new(),
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_catalog(mut self, catalog: &str) -> Self {
        self.catalog = Some(catalog.to_string());
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_resource_group(mut self, group: &str) -> Self {
        self.resource_group = Some(group.to_string());
        self
    }

    pub fn with_session_property(mut self, name: &str, value: &str) -> Self {
        self.session_properties
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// `host:port` pair used for the reachability probe
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Source identifier with `{username}` substituted
    pub fn resolved_source(&self) -> Option<String> {
        self.source
            .as_deref()
            .map(|source| source.replace("{username}", &self.username))
    }

    /// Check the preconditions that must hold before any network attempt
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(QuarryError::Configuration("host is required".into()));
        }
        if self.port == 0 {
            return Err(QuarryError::Configuration("port must be non-zero".into()));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(QuarryError::Configuration(
                "username and password are required".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("username", &self.username)
            .field("password", &"*".repeat(self.password.len()))
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("source", &self.source)
            .field("resource_group", &self.resource_group)
            .field("session_properties", &self.session_properties)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
