//! Scripted engine used by the service tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_connection::{ConnectionFactory, ConnectionPool, PoolConfig};
use quarry_core::{ColumnMeta, Connection, QuarryError, QueryResult, Result, Row, StatementResult, Value};

use crate::QueryService;

#[derive(Default)]
struct Script {
    rows: usize,
    failing: AtomicBool,
    statements: Mutex<Vec<String>>,
}

/// Factory whose connections answer a handful of known statements
#[derive(Clone)]
pub(crate) struct ScriptedFactory {
    script: Arc<Script>,
}

impl ScriptedFactory {
    /// Plain `SELECT`s return `rows` rows of a single `n` column
    pub(crate) fn with_rows(rows: usize) -> Self {
        Self {
            script: Arc::new(Script {
                rows,
                ..Script::default()
            }),
        }
    }

    pub(crate) fn fail_queries(&self, failing: bool) {
        self.script.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.script.statements.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(ScriptedConnection {
            script: self.script.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
    closed: AtomicBool,
}

fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    let mut result = QueryResult::empty();
    result.columns = names
        .iter()
        .enumerate()
        .map(|(ordinal, name)| ColumnMeta {
            name: name.clone(),
            data_type: "varchar".into(),
            nullable: true,
            ordinal,
        })
        .collect();
    result.rows = rows.into_iter().map(|values| Row::new(names.clone(), values)).collect();
    result
}

fn text(s: &str) -> Value {
    Value::Varchar(s.to_string())
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn driver_name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, _sql: &str) -> Result<StatementResult> {
        Err(QuarryError::NotSupported("execute".into()))
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        if self.script.failing.load(Ordering::SeqCst) {
            return Err(QuarryError::Query("SYNTAX_ERROR: line 1:8".into()));
        }
        if sql != "SELECT 1" {
            self.script.statements.lock().push(sql.to_string());
        }

        let result = if sql == "SELECT 1" {
            table(&["_col0"], vec![vec![Value::Integer(1)]])
        } else if sql.starts_with("SHOW TABLES") {
            table(&["Table"], vec![vec![text("orders")], vec![text("customers")]])
        } else if sql.starts_with("DESCRIBE") {
            table(
                &["Column", "Type", "Extra", "Comment"],
                vec![
                    vec![text("id"), text("bigint"), text(""), text("")],
                    vec![text("total"), text("decimal(10,2)"), text(""), text("gross")],
                ],
            )
        } else {
            let rows = (0..self.script.rows as i64).map(|n| vec![Value::BigInt(n)]).collect();
            table(&["n"], rows)
        };
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A service over a small pool of scripted connections, default schema `default`
pub(crate) async fn service(factory: &ScriptedFactory) -> QueryService {
    let pool = ConnectionPool::new(PoolConfig::new(1, 2), factory.clone()).await;
    QueryService::new(pool, "default")
}
