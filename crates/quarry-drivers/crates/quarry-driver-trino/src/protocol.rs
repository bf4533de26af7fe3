//! Statement protocol wire types and value decoding

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use quarry_core::Value;
use serde::Deserialize;

/// One page of a statement response (`POST /v1/statement` or a `nextUri` GET)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<serde_json::Value>>>,
    #[serde(default)]
    pub error: Option<QueryError>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub update_count: Option<u64>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_signature: String,
}

/// Failure reported by the engine inside a response page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    #[serde(default)]
    pub error_name: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_name {
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Warning {
    pub message: String,
}

/// Which header family the server expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDialect {
    Trino,
    Presto,
}

impl HeaderDialect {
    pub fn prefix(&self) -> &'static str {
        match self {
            HeaderDialect::Trino => "X-Trino",
            HeaderDialect::Presto => "X-Presto",
        }
    }

    /// Full header name, e.g. `X-Trino-User`
    pub fn header(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix(), suffix)
    }
}

/// Decode one cell according to its engine type signature.
///
/// Values that do not match the declared type are kept rather than dropped:
/// strings stay strings and anything else is carried as JSON.
pub fn decode_value(type_signature: &str, json: &serde_json::Value) -> Value {
    if json.is_null() {
        return Value::Null;
    }

    let signature = type_signature.trim().to_ascii_lowercase();
    let base = signature
        .split(['(', ' '])
        .next()
        .unwrap_or_default();
    let with_time_zone = signature.contains("with time zone");

    let decoded = match base {
        "boolean" => json.as_bool().map(Value::Boolean),
        "tinyint" => json
            .as_i64()
            .and_then(|v| i8::try_from(v).ok())
            .map(Value::TinyInt),
        "smallint" => json
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .map(Value::SmallInt),
        "integer" => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Integer),
        "bigint" => json.as_i64().map(Value::BigInt),
        "real" => decode_float(json).map(|v| Value::Real(v as f32)),
        "double" => decode_float(json).map(Value::Double),
        "decimal" => match json {
            serde_json::Value::String(s) => Some(Value::Decimal(s.clone())),
            serde_json::Value::Number(n) => Some(Value::Decimal(n.to_string())),
            _ => None,
        },
        "varchar" | "char" => json.as_str().map(|s| Value::Varchar(s.to_string())),
        "date" => json
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(Value::Date),
        "time" if !with_time_zone => json
            .as_str()
            .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok())
            .map(Value::Time),
        "timestamp" if !with_time_zone => json
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
            .map(Value::Timestamp),
        "timestamp" => json.as_str().and_then(parse_timestamp_tz).map(Value::TimestampTz),
        "uuid" => json
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(Value::Uuid),
        "json" => Some(match json.as_str() {
            Some(text) => serde_json::from_str(text)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::Varchar(text.to_string())),
            None => Value::Json(json.clone()),
        }),
        "array" => json.as_array().map(|items| {
            let element = element_signature(&signature);
            Value::Array(items.iter().map(|item| decode_value(element, item)).collect())
        }),
        "map" | "row" => Some(Value::Json(json.clone())),
        _ => None,
    };

    decoded.unwrap_or_else(|| fallback(json))
}

/// `array(varchar(3))` -> `varchar(3)`
fn element_signature(signature: &str) -> &str {
    match (signature.find('('), signature.rfind(')')) {
        (Some(open), Some(close)) if open < close => &signature[open + 1..close],
        _ => "",
    }
}

/// Offsets (`+01:00`) and `UTC` are understood; named zones are not and
/// the value stays a string.
fn parse_timestamp_tz(text: &str) -> Option<DateTime<FixedOffset>> {
    let normalized = match text.strip_suffix(" UTC") {
        Some(local) => format!("{} +00:00", local),
        None => text.to_string(),
    };
    DateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f %:z").ok()
}

fn decode_float(json: &serde_json::Value) -> Option<f64> {
    match json {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn fallback(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::String(s) => Value::Varchar(s.clone()),
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(i),
            None => n.as_f64().map(Value::Double).unwrap_or(Value::Json(json.clone())),
        },
        other => Value::Json(other.clone()),
    }
}
