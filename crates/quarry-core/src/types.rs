//! Core types for Quarry

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One decoded cell, named after the engine type it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    /// Kept as text so no precision is lost
    Decimal(String),
    /// `varchar`, `char`, and any type without a dedicated variant
    Varchar(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// `timestamp with time zone` carrying a numeric offset or `UTC`
    TimestampTz(DateTime<FixedOffset>),
    /// `array(T)`, elements decoded as `T`
    Array(Vec<Value>),
    /// `json`, `map` and `row`
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer width widened to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::TinyInt(v) => Some(v.into()),
            Value::SmallInt(v) => Some(v.into()),
            Value::Integer(v) => Some(v.into()),
            Value::BigInt(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a plain JSON value for tool responses.
    ///
    /// Temporal and decimal values become strings; non-finite floats
    /// become their textual form because JSON has no representation for them.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Boolean(v) => Json::Bool(*v),
            Value::TinyInt(v) => Json::from(*v),
            Value::SmallInt(v) => Json::from(*v),
            Value::Integer(v) => Json::from(*v),
            Value::BigInt(v) => Json::from(*v),
            Value::Real(v) => float_to_json(f64::from(*v)),
            Value::Double(v) => float_to_json(*v),
            Value::Decimal(v) | Value::Varchar(v) => Json::String(v.clone()),
            Value::TimestampTz(v) => Json::String(v.to_rfc3339()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Json(v) => v.clone(),
            Value::Uuid(_) | Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => {
                Json::String(self.to_string())
            }
        }
    }
}

fn float_to_json(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(v.to_string()))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::Varchar(v) => f.write_str(v),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::TimestampTz(v) => write!(f, "{}", v),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

/// One result row; cells line up with the result's columns
#[derive(Debug, Clone)]
pub struct Row {
    pub values: Vec<Value>,
    columns: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == name)?;
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    /// Column name
    #[serde(default)]
    pub name: String,
    /// Engine type signature, e.g. `varchar(32)` or `array(bigint)`
    #[serde(default)]
    pub data_type: String,
    /// Whether the column can be NULL
    #[serde(default)]
    pub nullable: bool,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

/// Query result
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Unique result ID
    pub id: Uuid,
    /// Engine-assigned query ID, when the engine reports one
    pub query_id: Option<String>,
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows affected (for DML statements)
    pub affected_rows: u64,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
    /// Warnings from the engine
    pub warnings: Vec<String>,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            query_id: None,
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            execution_time_ms: 0,
            warnings: Vec::new(),
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in result order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// First column of the first row, if any
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(0))
    }
}

/// Result of a statement that does not return rows
#[derive(Debug, Clone)]
pub struct StatementResult {
    /// Whether this was a query (SELECT) or a command
    pub is_query: bool,
    /// Query result (if is_query is true)
    pub result: Option<QueryResult>,
    /// Rows affected (if is_query is false)
    pub affected_rows: u64,
    /// Update type reported by the engine, e.g. `SET SESSION` or `INSERT`
    pub update_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_value_to_json() {
        assert_eq!(Value::Null.to_json(), json!(null));
        assert_eq!(Value::Integer(1).to_json(), json!(1));
        assert_eq!(Value::Decimal("12.50".into()).to_json(), json!("12.50"));
        assert_eq!(
            Value::Array(vec![Value::BigInt(1), Value::Varchar("a".into())]).to_json(),
            json!([1, "a"])
        );
        assert_eq!(Value::Double(f64::NAN).to_json(), json!("NaN"));

        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("valid date");
        assert_eq!(Value::Date(date).to_json(), json!("2024-03-09"));

        let at = DateTime::parse_from_rfc3339("2024-03-09T10:11:12+05:30").expect("timestamp");
        assert_eq!(Value::TimestampTz(at).to_json(), json!("2024-03-09T10:11:12+05:30"));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Varchar("orders".into()).to_string(), "orders");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(
            Value::Array(vec![Value::SmallInt(3), Value::Null]).to_string(),
            "[3, NULL]"
        );
        assert_eq!(Value::Json(json!({"k": 1})).to_string(), "{\"k\":1}");
    }

    #[test]
    fn test_integer_widths_widen() {
        assert_eq!(Value::TinyInt(-3).as_i64(), Some(-3));
        assert_eq!(Value::Integer(7).as_i64(), Some(7));
        assert_eq!(Value::Varchar("7".into()).as_i64(), None);
    }

    #[test]
    fn test_row_lookup_by_name() {
        let row = Row::new(
            vec!["Column".into(), "Type".into()],
            vec![Value::Varchar("id".into()), Value::Varchar("bigint".into())],
        );
        assert_eq!(row.get_by_name("Type"), Some(&Value::Varchar("bigint".into())));
        assert_eq!(row.get_by_name("Missing"), None);
        assert_eq!(row.columns().len(), 2);
    }

    #[test]
    fn test_query_result_scalar() {
        let mut result = QueryResult::empty();
        assert!(result.scalar().is_none());

        result.rows.push(Row::new(vec!["_col0".into()], vec![Value::Integer(1)]));
        assert_eq!(result.scalar().and_then(Value::as_i64), Some(1));
    }
}
