//! Opening verified engine connections

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::{Connection, ConnectionConfig, DatabaseDriver, QuarryError, Result};

use crate::health::{check_liveness, probe_reachability};

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection that is ready for use
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Whether an idle connection is still usable.
    ///
    /// Called by the maintenance loop; the default only checks that the
    /// connection has not been closed.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Opens connections through a [`DatabaseDriver`] in four steps:
///
/// 1. a TCP reachability probe bounded by `connect_timeout`
/// 2. the driver handshake
/// 3. `SET SESSION` for each configured session property (failures only warn)
/// 4. a `SELECT 1` liveness probe; the connection is closed if it fails
pub struct EngineConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

impl EngineConnectionFactory {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn apply_session_properties(&self, connection: &dyn Connection) {
        for (name, value) in &self.config.session_properties {
            let sql = format!("SET SESSION {} = {}", name, session_literal(value));
            match connection.execute(&sql).await {
                Ok(_) => tracing::debug!(property = %name, "session property applied"),
                Err(e) => {
                    tracing::warn!(property = %name, error = %e, "failed to apply session property")
                }
            }
        }
    }
}

#[async_trait]
impl ConnectionFactory for EngineConnectionFactory {
    #[tracing::instrument(skip(self), fields(address = %self.config.address(), driver = self.driver.name()))]
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.config.validate()?;

        let reach = probe_reachability(&self.config.address(), self.config.connect_timeout).await?;
        tracing::trace!(?reach, "engine reachable");

        let connection = self.driver.connect(&self.config).await.map_err(|e| match e {
            QuarryError::Configuration(_) | QuarryError::Creation(_) => e,
            other => QuarryError::Creation(other.to_string()),
        })?;

        self.apply_session_properties(&*connection).await;

        match check_liveness(&*connection).await {
            Ok(latency) => {
                tracing::debug!(?latency, "connection opened");
                Ok(connection)
            }
            Err(e) => {
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        match check_liveness(conn).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "idle connection failed validation");
                false
            }
        }
    }
}

/// Render a session property value as a SQL literal.
///
/// Booleans and numbers pass through; everything else becomes a quoted
/// string.
fn session_literal(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed.parse::<f64>().is_ok()
    {
        trimmed.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockDriver, init_test_logging};
    use tokio::net::TcpListener;

    async fn listening_config() -> (TcpListener, ConnectionConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let config = ConnectionConfig::new("mock", "127.0.0.1", port).with_credentials("analyst", "secret");
        (listener, config)
    }

    fn factory(driver: &Arc<MockDriver>, config: ConnectionConfig) -> EngineConnectionFactory {
        EngineConnectionFactory::new(driver.clone() as Arc<dyn DatabaseDriver>, config)
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_dialing() {
        let driver = Arc::new(MockDriver::new());
        let config = ConnectionConfig::new("mock", "127.0.0.1", 1);
        let err = factory(&driver, config).create().await.err().expect("no credentials");
        assert!(matches!(err, QuarryError::Configuration(_)));
        assert_eq!(driver.connects(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_engine_skips_handshake() {
        init_test_logging();
        let (listener, config) = listening_config().await;
        drop(listener);

        let driver = Arc::new(MockDriver::new());
        let err = factory(&driver, config).create().await.err().expect("nothing listening");
        assert!(matches!(err, QuarryError::Connectivity { .. }));
        assert_eq!(driver.connects(), 0);
    }

    #[tokio::test]
    async fn test_create_applies_session_properties_then_probes() {
        init_test_logging();
        let (_listener, config) = listening_config().await;
        let config = config
            .with_session_property("query_max_run_time", "1h")
            .with_session_property("join_distribution_type", "BROADCAST");

        let driver = Arc::new(MockDriver::new());
        let connection = factory(&driver, config).create().await.expect("create");
        assert!(!connection.is_closed());

        let opened = driver.last_connection().expect("connection");
        assert_eq!(
            opened.statements(),
            vec![
                "SET SESSION join_distribution_type = 'BROADCAST'".to_string(),
                "SET SESSION query_max_run_time = '1h'".to_string(),
                "SELECT 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_session_property_only_warns() {
        let (_listener, config) = listening_config().await;
        let config = config.with_session_property("query_priority", "5");

        let driver = Arc::new(MockDriver::rejecting_session_properties());
        assert!(factory(&driver, config).create().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_liveness_closes_connection() {
        let (_listener, config) = listening_config().await;

        let driver = Arc::new(MockDriver::answering(2));
        let engine = factory(&driver, config);
        let err = engine.create().await.err().expect("probe answered 2");
        assert!(matches!(err, QuarryError::Liveness(_)));
        assert!(driver.last_connection().expect("connection").is_closed());
    }

    #[tokio::test]
    async fn test_validate_uses_liveness_probe() {
        let (_listener, config) = listening_config().await;
        let driver = Arc::new(MockDriver::new());
        let engine = factory(&driver, config);

        let connection = engine.create().await.expect("create");
        assert!(engine.validate(&*connection).await);

        driver.last_connection().expect("connection").break_backend();
        assert!(!engine.validate(&*connection).await);
    }

    #[test]
    fn test_session_literal() {
        assert_eq!(session_literal("true"), "true");
        assert_eq!(session_literal("42"), "42");
        assert_eq!(session_literal("1h"), "'1h'");
        assert_eq!(session_literal("it's"), "'it''s'");
    }
}
