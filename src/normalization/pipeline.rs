//! Transformation pipeline
//!
//! Runs a rule's operations over a resolved raw value, in declared order, then
//! coerces the result to the canonical field's declared type. Nothing here
//! returns an error: a failed operation becomes a `transform_failed` outcome
//! that the orchestrator records against the field.

use super::record::FieldOutcome;
use super::value::{parse_decimal, CanonicalValue};
use crate::catalog::FieldDataType;
use crate::mapping::{EpochUnit, TransformOp, TransformSpec};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// Which step of the pipeline failed and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFailure {
    pub op: String,
    pub reason: String,
}

impl TransformFailure {
    fn new(op: &str, reason: impl Into<String>) -> Self {
        Self {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

/// Output of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub value: Option<CanonicalValue>,
    pub outcome: FieldOutcome,
    pub failure: Option<TransformFailure>,
}

/// Apply a transformation spec to a resolved raw value.
///
/// An absent raw value, or one the ops reduce to nothing (JSON `null`, an
/// empty numeric string), falls back to `default_value`. A default stands in
/// for the extracted element, so structural ops (`array_index`,
/// `array_lookup`) are skipped for it; the value ops and type coercion still
/// run. With no default the outcome is `missing`.
pub fn apply(
    raw: Option<&Value>,
    spec: &TransformSpec,
    default_value: Option<&Value>,
    target: FieldDataType,
) -> Transformed {
    if let Some(value) = raw.filter(|v| !v.is_null()) {
        match run(spec.ops().iter(), value, target) {
            Ok(CanonicalValue::Null) => {}
            Ok(value) => return Transformed::success(value, FieldOutcome::Resolved),
            Err(failure) => return Transformed::failed(failure),
        }
    }

    let Some(default) = default_value.filter(|v| !v.is_null()) else {
        return Transformed::missing();
    };

    match run(spec.ops().iter().filter(|op| !op.is_structural()), default, target) {
        Ok(CanonicalValue::Null) => Transformed::missing(),
        Ok(value) => Transformed::success(value, FieldOutcome::Defaulted),
        Err(failure) => Transformed::failed(failure),
    }
}

fn run<'a>(
    mut ops: impl Iterator<Item = &'a TransformOp>,
    input: &Value,
    target: FieldDataType,
) -> Result<CanonicalValue, TransformFailure> {
    ops.try_fold(CanonicalValue::from_json(input), |value, op| run_op(op, value))
        .and_then(|value| coerce(value, target))
}

impl Transformed {
    fn success(value: CanonicalValue, outcome: FieldOutcome) -> Self {
        Self {
            value: Some(value),
            outcome,
            failure: None,
        }
    }

    fn missing() -> Self {
        Self {
            value: None,
            outcome: FieldOutcome::Missing,
            failure: None,
        }
    }

    fn failed(failure: TransformFailure) -> Self {
        Self {
            value: None,
            outcome: FieldOutcome::TransformFailed,
            failure: Some(failure),
        }
    }
}

/// Run a single operation
pub fn run_op(op: &TransformOp, value: CanonicalValue) -> Result<CanonicalValue, TransformFailure> {
    let name = op.name();

    // Empty numeric strings become null; null flows through untouched
    if value.is_null() {
        return Ok(value);
    }

    match op {
        TransformOp::Identity => Ok(value),
        TransformOp::ToNumber => to_number(name, value),
        TransformOp::ToInteger => match to_number(name, value)? {
            CanonicalValue::Number(d) => decimal_to_i64(d)
                .map(CanonicalValue::Integer)
                .ok_or_else(|| TransformFailure::new(name, format!("{} is not an integer", d))),
            other => Ok(other),
        },
        TransformOp::Scale { factor } => {
            let d = numeric(name, &value)?;
            d.checked_mul(*factor)
                .map(CanonicalValue::Number)
                .ok_or_else(|| TransformFailure::new(name, format!("{} x {} overflows", d, factor)))
        }
        TransformOp::Inverse => {
            let d = numeric(name, &value)?;
            if d.is_zero() {
                return Err(TransformFailure::new(name, "cannot invert zero"));
            }
            Decimal::ONE
                .checked_div(d)
                .map(CanonicalValue::Number)
                .ok_or_else(|| TransformFailure::new(name, format!("1 / {} overflows", d)))
        }
        TransformOp::EpochToDatetime { unit } => match value {
            ts @ CanonicalValue::Timestamp(_) => Ok(ts),
            other => {
                let d = numeric(name, &other)?;
                epoch_to_datetime(d, *unit)
                    .map(CanonicalValue::Timestamp)
                    .ok_or_else(|| TransformFailure::new(name, format!("{} is not a valid epoch", d)))
            }
        },
        TransformOp::ParseDatetime { format } => match value {
            ts @ CanonicalValue::Timestamp(_) => Ok(ts),
            CanonicalValue::Text(s) => parse_datetime(&s, format.as_deref())
                .map(CanonicalValue::Timestamp)
                .ok_or_else(|| TransformFailure::new(name, format!("cannot parse '{}' as datetime", s))),
            other => Err(expected(name, "string", &other)),
        },
        TransformOp::ArrayIndex { index } => match value {
            CanonicalValue::Array(items) => items
                .get(*index)
                .map(CanonicalValue::from_json)
                .ok_or_else(|| {
                    TransformFailure::new(
                        name,
                        format!("index {} out of range for array of {}", index, items.len()),
                    )
                }),
            other => Err(expected(name, "array", &other)),
        },
        TransformOp::ArrayLookup { field } => match value {
            CanonicalValue::Array(items) => items
                .iter()
                .filter_map(Value::as_array)
                .filter(|pair| pair.len() >= 2)
                .find(|pair| key_text(&pair[0]) == *field)
                .map(|pair| CanonicalValue::from_json(&pair[1]))
                .ok_or_else(|| TransformFailure::new(name, format!("no entry keyed '{}'", field))),
            other => Err(expected(name, "array", &other)),
        },
        TransformOp::StringUpperToEnum { allowed } => match value {
            CanonicalValue::Text(s) => {
                let upper = s.trim().to_uppercase();
                match allowed {
                    Some(values) if !values.contains(&upper) => Err(TransformFailure::new(
                        name,
                        format!("'{}' is not one of {:?}", upper, values),
                    )),
                    _ => Ok(CanonicalValue::Text(upper)),
                }
            }
            other => Err(expected(name, "string", &other)),
        },
    }
}

/// Coerce a value to a canonical field's declared type
pub fn coerce(value: CanonicalValue, target: FieldDataType) -> Result<CanonicalValue, TransformFailure> {
    let op = format!("coerce_{}", target.as_str());
    let fail = |value: &CanonicalValue| {
        TransformFailure::new(&op, format!("cannot convert {} to {}", value.kind(), target.as_str()))
    };

    if value.is_null() {
        return Ok(value);
    }

    match target {
        FieldDataType::Numeric => match value {
            number @ CanonicalValue::Number(_) => Ok(number),
            other => other.as_decimal().map(CanonicalValue::Number).ok_or_else(|| fail(&other)),
        },
        FieldDataType::Integer => match value {
            integer @ CanonicalValue::Integer(_) => Ok(integer),
            other => other
                .as_decimal()
                .and_then(decimal_to_i64)
                .map(CanonicalValue::Integer)
                .ok_or_else(|| fail(&other)),
        },
        FieldDataType::String => match value {
            text @ CanonicalValue::Text(_) => Ok(text),
            CanonicalValue::Integer(i) => Ok(CanonicalValue::Text(i.to_string())),
            CanonicalValue::Number(d) => Ok(CanonicalValue::Text(d.to_string())),
            CanonicalValue::Bool(b) => Ok(CanonicalValue::Text(b.to_string())),
            CanonicalValue::Timestamp(ts) => Ok(CanonicalValue::Text(ts.to_rfc3339())),
            other => Err(fail(&other)),
        },
        FieldDataType::Boolean => match value {
            flag @ CanonicalValue::Bool(_) => Ok(flag),
            CanonicalValue::Integer(0) => Ok(CanonicalValue::Bool(false)),
            CanonicalValue::Integer(1) => Ok(CanonicalValue::Bool(true)),
            CanonicalValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(CanonicalValue::Bool(true)),
                "false" | "0" => Ok(CanonicalValue::Bool(false)),
                _ => Err(fail(&CanonicalValue::Text(s))),
            },
            other => Err(fail(&other)),
        },
        FieldDataType::Datetime => match value {
            ts @ CanonicalValue::Timestamp(_) => Ok(ts),
            CanonicalValue::Text(s) => parse_datetime(&s, None)
                .or_else(|| parse_decimal(&s).and_then(|d| epoch_to_datetime(d, EpochUnit::Milliseconds)))
                .map(CanonicalValue::Timestamp)
                .ok_or_else(|| fail(&CanonicalValue::Text(s.clone()))),
            other @ (CanonicalValue::Integer(_) | CanonicalValue::Number(_)) => other
                .as_decimal()
                .and_then(|d| epoch_to_datetime(d, EpochUnit::Milliseconds))
                .map(CanonicalValue::Timestamp)
                .ok_or_else(|| fail(&other)),
            other => Err(fail(&other)),
        },
        FieldDataType::Array => match value {
            array @ CanonicalValue::Array(_) => Ok(array),
            other => Err(fail(&other)),
        },
        FieldDataType::Object => match value {
            object @ CanonicalValue::Object(_) => Ok(object),
            other => Err(fail(&other)),
        },
    }
}

fn to_number(op: &str, value: CanonicalValue) -> Result<CanonicalValue, TransformFailure> {
    match value {
        CanonicalValue::Number(_) => Ok(value),
        CanonicalValue::Integer(i) => Ok(CanonicalValue::Number(Decimal::from(i))),
        CanonicalValue::Text(s) if s.trim().is_empty() => Ok(CanonicalValue::Null),
        CanonicalValue::Text(s) => parse_decimal(&s)
            .map(CanonicalValue::Number)
            .ok_or_else(|| TransformFailure::new(op, format!("'{}' is not numeric", s))),
        other => Err(expected(op, "numeric string", &other)),
    }
}

fn numeric(op: &str, value: &CanonicalValue) -> Result<Decimal, TransformFailure> {
    value
        .as_decimal()
        .ok_or_else(|| expected(op, "numeric value", value))
}

fn expected(op: &str, wanted: &str, got: &CanonicalValue) -> TransformFailure {
    TransformFailure::new(op, format!("expected {}, got {}", wanted, got.kind()))
}

fn decimal_to_i64(d: Decimal) -> Option<i64> {
    if d.fract().is_zero() {
        d.to_i64()
    } else {
        None
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn epoch_to_datetime(value: Decimal, unit: EpochUnit) -> Option<DateTime<Utc>> {
    let nanos = value.checked_mul(Decimal::from(unit.nanos()))?.trunc().to_i64()?;
    let secs = nanos.div_euclid(1_000_000_000);
    let sub = u32::try_from(nanos.rem_euclid(1_000_000_000)).ok()?;
    DateTime::from_timestamp(secs, sub)
}

fn parse_datetime(raw: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    match format {
        None => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Some(fmt) => DateTime::parse_from_str(raw, fmt)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, fmt)
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
    }
}
