//! Transformation spec parsing
//!
//! A rule's transformation spec is stored as JSON. It is parsed and validated
//! once, when the rule is loaded, into an ordered list of [`TransformOp`]s.
//! Accepted shapes:
//!
//! ```text
//! null                                         no operations
//! {"op": "scale", "factor": 0.001}             one operation
//! ["to_number", {"op": "scale", "factor": 1}]  ordered operations
//! {"type": "array_extract", "index": 0,        legacy single-rule form,
//!  "subtype": "string_to_numeric"}             expanded to array_index + to_number
//! ```

use crate::normalization::parse_decimal;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Unit of an epoch timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl EpochUnit {
    /// Nanoseconds per unit
    pub fn nanos(&self) -> i64 {
        match self {
            EpochUnit::Seconds => 1_000_000_000,
            EpochUnit::Milliseconds => 1_000_000,
            EpochUnit::Microseconds => 1_000,
            EpochUnit::Nanoseconds => 1,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "s" | "sec" | "seconds" => Some(EpochUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Some(EpochUnit::Milliseconds),
            "us" | "micros" | "microseconds" => Some(EpochUnit::Microseconds),
            "ns" | "nanos" | "nanoseconds" => Some(EpochUnit::Nanoseconds),
            _ => None,
        }
    }
}

/// A single named transformation with its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    Identity,
    ToNumber,
    ToInteger,
    Scale { factor: Decimal },
    Inverse,
    EpochToDatetime { unit: EpochUnit },
    ParseDatetime { format: Option<String> },
    ArrayIndex { index: usize },
    ArrayLookup { field: String },
    StringUpperToEnum { allowed: Option<Vec<String>> },
}

impl TransformOp {
    /// Whether the op picks a piece out of a container rather than
    /// converting a value
    pub fn is_structural(&self) -> bool {
        matches!(self, TransformOp::ArrayIndex { .. } | TransformOp::ArrayLookup { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Identity => "identity",
            TransformOp::ToNumber => "to_number",
            TransformOp::ToInteger => "to_integer",
            TransformOp::Scale { .. } => "scale",
            TransformOp::Inverse => "inverse",
            TransformOp::EpochToDatetime { .. } => "epoch_to_datetime",
            TransformOp::ParseDatetime { .. } => "parse_datetime",
            TransformOp::ArrayIndex { .. } => "array_index",
            TransformOp::ArrayLookup { .. } => "array_lookup",
            TransformOp::StringUpperToEnum { .. } => "string_upper_to_enum",
        }
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, validated transformation spec
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransformSpec(Vec<TransformOp>);

impl TransformSpec {
    pub fn new(ops: Vec<TransformOp>) -> Self {
        Self(ops)
    }

    /// Parse the stored JSON form. The error is a human-readable reason.
    pub fn parse(spec: &Value) -> Result<Self, String> {
        let mut ops = Vec::new();

        match spec {
            Value::Null => {}
            Value::Array(items) => {
                for (position, item) in items.iter().enumerate() {
                    parse_item(item, &mut ops).map_err(|e| format!("op #{}: {}", position, e))?;
                }
            }
            Value::Object(_) | Value::String(_) => parse_item(spec, &mut ops)?,
            other => {
                return Err(format!(
                    "transformation spec must be null, an object or an array, got {}",
                    other
                ))
            }
        }

        Ok(Self(ops))
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_item(item: &Value, ops: &mut Vec<TransformOp>) -> Result<(), String> {
    match item {
        Value::String(name) => {
            ops.push(parse_op(name, &Map::new())?);
            Ok(())
        }
        Value::Object(params) => {
            let name = params
                .get("op")
                .or_else(|| params.get("type"))
                .and_then(Value::as_str)
                .ok_or_else(|| "operation object needs a string 'op'".to_string())?;

            ops.push(parse_op(name, params)?);

            // Legacy rules chain a follow-up conversion through `subtype`
            if let Some(subtype) = params.get("subtype") {
                let subtype = subtype
                    .as_str()
                    .ok_or_else(|| "'subtype' must be an operation name".to_string())?;
                ops.push(parse_op(subtype, &Map::new())?);
            }
            Ok(())
        }
        other => Err(format!("operation must be a name or an object, got {}", other)),
    }
}

fn parse_op(name: &str, params: &Map<String, Value>) -> Result<TransformOp, String> {
    let op = match name {
        "identity" => TransformOp::Identity,
        "to_number" | "string_to_numeric" => TransformOp::ToNumber,
        "to_integer" | "string_to_integer" => TransformOp::ToInteger,
        "inverse" => TransformOp::Inverse,
        "scale" => {
            let factor = params
                .get("factor")
                .ok_or_else(|| "scale requires 'factor'".to_string())?;
            let factor = match factor {
                Value::Number(n) => parse_decimal(&n.to_string()),
                Value::String(s) => parse_decimal(s),
                _ => None,
            }
            .ok_or_else(|| format!("scale 'factor' must be numeric, got {}", factor))?;
            TransformOp::Scale { factor }
        }
        "epoch_to_datetime" => {
            let unit = match params.get("unit") {
                None | Some(Value::Null) => return Err("epoch_to_datetime requires 'unit'".to_string()),
                Some(Value::String(raw)) => EpochUnit::parse(raw)
                    .ok_or_else(|| format!("unknown epoch unit '{}'", raw))?,
                Some(other) => return Err(format!("epoch 'unit' must be a string, got {}", other)),
            };
            TransformOp::EpochToDatetime { unit }
        }
        "ms_to_datetime" => TransformOp::EpochToDatetime {
            unit: EpochUnit::Milliseconds,
        },
        "parse_datetime" | "string_to_datetime" => {
            let format = match params.get("format") {
                None | Some(Value::Null) => None,
                Some(Value::String(f)) if f == "iso8601" || f == "rfc3339" => None,
                Some(Value::String(f)) => Some(f.clone()),
                Some(other) => return Err(format!("datetime 'format' must be a string, got {}", other)),
            };
            TransformOp::ParseDatetime { format }
        }
        "array_index" | "array_extract" => {
            let index = params
                .get("index")
                .ok_or_else(|| format!("{} requires 'index'", name))?;
            let index = index
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| format!("'index' must be a non-negative integer, got {}", index))?;
            TransformOp::ArrayIndex { index }
        }
        "array_lookup" | "array_extract_by_field" => {
            let field = params
                .get("field")
                .or_else(|| params.get("field_name"))
                .and_then(Value::as_str)
                .ok_or_else(|| format!("{} requires a string 'field'", name))?;
            TransformOp::ArrayLookup {
                field: field.to_string(),
            }
        }
        "string_upper_to_enum" => {
            let allowed = match params.get("allowed") {
                None | Some(Value::Null) => None,
                Some(Value::Array(values)) => Some(
                    values
                        .iter()
                        .map(|v| {
                            v.as_str()
                                .map(str::to_uppercase)
                                .ok_or_else(|| format!("'allowed' entries must be strings, got {}", v))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                Some(other) => return Err(format!("'allowed' must be an array, got {}", other)),
            };
            TransformOp::StringUpperToEnum { allowed }
        }
        other => return Err(format!("unknown operation '{}'", other)),
    };

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_null_and_empty() {
        assert!(TransformSpec::parse(&json!(null)).unwrap().is_empty());
        assert!(TransformSpec::parse(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_ordered_list() {
        let spec = TransformSpec::parse(&json!([
            "to_number",
            {"op": "scale", "factor": 0.00000001}
        ]))
        .unwrap();

        assert_eq!(
            spec.ops(),
            &[
                TransformOp::ToNumber,
                TransformOp::Scale {
                    factor: dec!(0.00000001)
                }
            ]
        );
    }

    #[test]
    fn test_parse_legacy_subtype() {
        let spec = TransformSpec::parse(&json!({
            "type": "array_extract",
            "index": 1,
            "subtype": "string_to_numeric"
        }))
        .unwrap();

        assert_eq!(
            spec.ops(),
            &[TransformOp::ArrayIndex { index: 1 }, TransformOp::ToNumber]
        );

        let spec = TransformSpec::parse(&json!({"type": "ms_to_datetime"})).unwrap();
        assert_eq!(
            spec.ops(),
            &[TransformOp::EpochToDatetime {
                unit: EpochUnit::Milliseconds
            }]
        );
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        let cases = [
            json!({"op": "frobnicate"}),
            json!({"op": "scale"}),
            json!({"op": "scale", "factor": "abc"}),
            json!({"op": "array_index", "index": -1}),
            json!({"op": "epoch_to_datetime", "unit": "fortnights"}),
            json!({"op": "array_lookup"}),
            json!({"factor": 2}),
            json!(42),
            json!([{"op": "to_number"}, 7]),
        ];

        for case in cases {
            assert!(TransformSpec::parse(&case).is_err(), "expected {} to be rejected", case);
        }
    }

    #[test]
    fn test_epoch_unit_must_be_declared() {
        let err = TransformSpec::parse(&json!({"op": "epoch_to_datetime"})).unwrap_err();
        assert!(err.contains("unit"));
        assert!(TransformSpec::parse(&json!("epoch_to_datetime")).is_err());

        let spec = TransformSpec::parse(&json!({"op": "epoch_to_datetime", "unit": "us"})).unwrap();
        assert_eq!(
            spec.ops(),
            &[TransformOp::EpochToDatetime {
                unit: EpochUnit::Microseconds
            }]
        );
        assert!(TransformSpec::parse(&json!("ms_to_datetime")).is_ok());
    }

    #[test]
    fn test_array_ops_are_structural() {
        assert!(TransformOp::ArrayIndex { index: 0 }.is_structural());
        assert!(TransformOp::ArrayLookup { field: "ask".to_string() }.is_structural());
        assert!(!TransformOp::ToNumber.is_structural());
    }

    #[test]
    fn test_enum_allowed_values_are_uppercased() {
        let spec = TransformSpec::parse(&json!({
            "op": "string_upper_to_enum",
            "allowed": ["buy", "Sell"]
        }))
        .unwrap();

        assert_eq!(
            spec.ops(),
            &[TransformOp::StringUpperToEnum {
                allowed: Some(vec!["BUY".to_string(), "SELL".to_string()])
            }]
        );
    }
}
