//! Typed values produced by normalization

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Final (or intermediate) value of a canonical field
///
/// Serializes untagged: decimals as strings (no float rounding), timestamps
/// as RFC 3339, everything else as its natural JSON form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl CanonicalValue {
    /// Lift a raw JSON value into the typed representation
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CanonicalValue::Null,
            Value::Bool(b) => CanonicalValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CanonicalValue::Integer(i),
                None => match parse_decimal(&n.to_string()) {
                    Some(d) => CanonicalValue::Number(d),
                    // Out of Decimal range; keep the literal rather than lose it
                    None => CanonicalValue::Text(n.to_string()),
                },
            },
            Value::String(s) => CanonicalValue::Text(s.clone()),
            Value::Array(items) => CanonicalValue::Array(items.clone()),
            Value::Object(map) => CanonicalValue::Object(map.clone()),
        }
    }

    /// Short type name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            CanonicalValue::Null => "null",
            CanonicalValue::Bool(_) => "boolean",
            CanonicalValue::Integer(_) => "integer",
            CanonicalValue::Number(_) => "number",
            CanonicalValue::Text(_) => "string",
            CanonicalValue::Timestamp(_) => "datetime",
            CanonicalValue::Array(_) => "array",
            CanonicalValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    /// Numeric view of the value; numeric strings are parsed
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CanonicalValue::Integer(i) => Some(Decimal::from(*i)),
            CanonicalValue::Number(d) => Some(*d),
            CanonicalValue::Text(s) => parse_decimal(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CanonicalValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CanonicalValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Parse a vendor-quoted decimal.
///
/// Trims whitespace, drops `,` thousands separators, accepts a leading `+` or
/// `-` and scientific notation. Returns `None` for empty or non-numeric input.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let unsigned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if unsigned.is_empty() || unsigned.starts_with(['+', '-']) && unsigned.len() == 1 {
        return None;
    }

    if unsigned.contains(['e', 'E']) {
        return Decimal::from_scientific(unsigned).ok();
    }

    Decimal::from_str(unsigned).ok()
}
