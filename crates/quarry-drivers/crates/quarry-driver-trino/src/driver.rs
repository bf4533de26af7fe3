//! Trino driver implementation

use crate::connection::{TrinoConnection, map_transport_error};
use crate::protocol::HeaderDialect;
use async_trait::async_trait;
use quarry_core::{Connection, ConnectionConfig, DatabaseDriver, Result};
use std::sync::Arc;

/// Trino database driver
///
/// Also serves Presto coordinators, which speak the same statement protocol
/// under `X-Presto-*` headers.
pub struct TrinoDriver {
    dialect: HeaderDialect,
}

impl TrinoDriver {
    /// Create a new Trino driver instance
    pub fn new() -> Self {
        tracing::debug!("Trino driver initialized");
        Self {
            dialect: HeaderDialect::Trino,
        }
    }

    /// Driver for Presto coordinators
    pub fn presto() -> Self {
        tracing::debug!("Presto driver initialized");
        Self {
            dialect: HeaderDialect::Presto,
        }
    }

    pub fn dialect(&self) -> HeaderDialect {
        self.dialect
    }
}

impl Default for TrinoDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for TrinoDriver {
    fn id(&self) -> &'static str {
        self.name()
    }

    fn name(&self) -> &'static str {
        match self.dialect {
            HeaderDialect::Trino => "trino",
            HeaderDialect::Presto => "presto",
        }
    }

    fn display_name(&self) -> &'static str {
        match self.dialect {
            HeaderDialect::Trino => "Trino",
            HeaderDialect::Presto => "Presto",
        }
    }

    fn default_port(&self) -> Option<u16> {
        Some(8080)
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, port = config.port, driver = self.name()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        tracing::debug!("opening {} session", self.display_name());

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.query_timeout)
            .build()
            .map_err(map_transport_error)?;

        let connection = TrinoConnection::new(client, self.dialect, config);
        tracing::debug!("{} session ready", self.display_name());
        Ok(Arc::new(connection))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let mut url = format!(
            "{}://{}@{}:{}",
            config.protocol.scheme(),
            config.username,
            config.host,
            config.port
        );
        if let Some(catalog) = &config.catalog {
            url.push('/');
            url.push_str(catalog);
            if let Some(schema) = &config.schema {
                url.push('/');
                url.push_str(schema);
            }
        }
        url
    }
}
