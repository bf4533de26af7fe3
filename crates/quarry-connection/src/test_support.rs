//! Mock connections, factories and drivers shared by the unit tests

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, QuarryError, QueryResult, Result,
    Row, StatementResult, Value,
};

use crate::factory::ConnectionFactory;
use crate::health::check_liveness;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` controls it
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Mock connection for testing
pub(crate) struct MockConnection {
    #[allow(dead_code)]
    pub(crate) id: usize,
    closed: AtomicBool,
    broken: AtomicBool,
    fail_execute: AtomicBool,
    scalar: AtomicI64,
    statements: Mutex<Vec<String>>,
    live: Arc<AtomicUsize>,
}

impl MockConnection {
    pub(crate) fn new(id: usize, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            scalar: AtomicI64::new(1),
            statements: Mutex::new(Vec::new()),
            live,
        }
    }

    /// Make every later query fail as if the backend went away
    pub(crate) fn break_backend(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_scalar(&self, value: i64) {
        self.scalar.store(value, Ordering::SeqCst);
    }

    pub(crate) fn fail_execute(&self) {
        self.fail_execute.store(true, Ordering::SeqCst);
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str) -> Result<StatementResult> {
        self.statements.lock().push(sql.to_string());
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(QuarryError::Query("access denied to session property".into()));
        }
        Ok(StatementResult {
            is_query: false,
            result: None,
            affected_rows: 0,
            update_type: Some("SET SESSION".into()),
        })
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.statements.lock().push(sql.to_string());
        if self.is_closed() {
            return Err(QuarryError::Connection("Connection is closed".into()));
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(QuarryError::Query("backend went away".into()));
        }

        let mut result = QueryResult::empty();
        result.columns.push(ColumnMeta {
            name: "_col0".into(),
            data_type: "integer".into(),
            nullable: false,
            ordinal: 0,
        });
        result.rows.push(Row::new(
            vec!["_col0".into()],
            vec![Value::BigInt(self.scalar.load(Ordering::SeqCst))],
        ));
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that counts connections and can be told to misbehave
#[derive(Default)]
pub(crate) struct MockConnectionFactory {
    attempts: AtomicUsize,
    created: Mutex<Vec<Arc<MockConnection>>>,
    live: Arc<AtomicUsize>,
    peak: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    validations: AtomicUsize,
    panic_next_validate: AtomicBool,
    hang_validate: AtomicBool,
}

impl MockConnectionFactory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        let factory = Self::default();
        factory.set_failing(true);
        factory
    }

    /// Connections successfully created
    pub(crate) fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Created connections that have not been closed
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub(crate) fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.created.lock()[index].clone()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_next_validate(&self) {
        self.panic_next_validate.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hang_validation(&self) {
        self.hang_validate.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(QuarryError::Creation("backend unavailable".into()));
        }

        let connection = {
            let mut created = self.created.lock();
            let connection = Arc::new(MockConnection::new(created.len(), self.live.clone()));
            created.push(connection.clone());
            connection
        };
        self.peak.fetch_max(self.live(), Ordering::SeqCst);
        Ok(connection as Arc<dyn Connection>)
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if self.panic_next_validate.swap(false, Ordering::SeqCst) {
            panic!("probe exploded");
        }
        if self.hang_validate.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        check_liveness(conn).await.is_ok()
    }
}

/// Mock driver handing out [`MockConnection`]s
pub(crate) struct MockDriver {
    connects: AtomicUsize,
    scalar: i64,
    fail_execute: bool,
    last: Mutex<Option<Arc<MockConnection>>>,
    live: Arc<AtomicUsize>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            scalar: 1,
            fail_execute: false,
            last: Mutex::new(None),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connections whose liveness probe returns `scalar`
    pub(crate) fn answering(scalar: i64) -> Self {
        Self {
            scalar,
            ..Self::new()
        }
    }

    pub(crate) fn rejecting_session_properties() -> Self {
        Self {
            fail_execute: true,
            ..Self::new()
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.last.lock().clone()
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(MockConnection::new(id, self.live.clone()));
        connection.set_scalar(self.scalar);
        if self.fail_execute {
            connection.fail_execute();
        }
        *self.last.lock() = Some(connection.clone());
        Ok(connection as Arc<dyn Connection>)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        format!("mock://{}", config.address())
    }
}
