//! Normalized records and per-field outcomes

use super::value::CanonicalValue;
use crate::catalog::DataType;
use crate::mapping::SourceType;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Per-field disposition of a normalization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Resolved,
    Defaulted,
    Missing,
    TransformFailed,
}

impl FieldOutcome {
    /// Whether the field produced a usable value
    pub fn is_success(&self) -> bool {
        matches!(self, FieldOutcome::Resolved | FieldOutcome::Defaulted)
    }
}

/// Why a field ended up the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldDiagnostic {
    /// No active rule exists for this field under the vendor/data-type/source
    NoMappingDefined,
    /// Rules exist but none of their paths resolved and none has a default
    PathAbsent { tried: Vec<i64> },
    /// The winning rule's path resolved, but to an empty value, and it has no
    /// usable default
    EmptyValue { mapping_id: i64 },
    /// The winning rule's operation (or the final type coercion) failed
    TransformFailed {
        mapping_id: i64,
        op: String,
        reason: String,
    },
    /// Filled from call context (the vendor name) rather than the payload
    DerivedFromContext,
}

/// Value, outcome and provenance of one canonical field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldResult {
    pub value: Option<CanonicalValue>,
    pub outcome: FieldOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<FieldDiagnostic>,
}

impl FieldResult {
    pub fn missing(diagnostic: FieldDiagnostic) -> Self {
        Self {
            value: None,
            outcome: FieldOutcome::Missing,
            mapping_id: None,
            diagnostic: Some(diagnostic),
        }
    }
}

/// One entry of a record, in template order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub field_name: String,
    pub is_required: bool,
    pub result: FieldResult,
}

/// Result of normalizing one payload
///
/// Serializes as `{vendor, data_type, source_type, rule_generation, fields:
/// {canonical_field_name -> {value, outcome, ...}}}` with fields in template order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub vendor: String,
    pub data_type: DataType,
    pub source_type: SourceType,
    /// Generation of the rule snapshot this record was produced from
    pub rule_generation: u64,
    pub fields: Vec<RecordField>,
}

impl NormalizedRecord {
    pub fn get(&self, field_name: &str) -> Option<&FieldResult> {
        self.fields
            .iter()
            .find(|f| f.field_name == field_name)
            .map(|f| &f.result)
    }

    /// Final value of a field, if it produced one
    pub fn value(&self, field_name: &str) -> Option<&CanonicalValue> {
        self.get(field_name).and_then(|r| r.value.as_ref())
    }

    pub fn outcome(&self, field_name: &str) -> Option<FieldOutcome> {
        self.get(field_name).map(|r| r.outcome)
    }

    /// Required fields that did not produce a value
    pub fn missing_required(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_required && !f.result.outcome.is_success())
            .map(|f| f.field_name.as_str())
            .collect()
    }

    /// Whether every required field produced a value
    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Fields whose winning rule failed to transform
    pub fn failed_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.result.outcome == FieldOutcome::TransformFailed)
            .map(|f| f.field_name.as_str())
            .collect()
    }

    pub fn count(&self, outcome: FieldOutcome) -> usize {
        self.fields.iter().filter(|f| f.result.outcome == outcome).count()
    }
}

struct FieldsMap<'a>(&'a [RecordField]);

impl Serialize for FieldsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for field in self.0 {
            map.serialize_entry(&field.field_name, &field.result)?;
        }
        map.end()
    }
}

impl Serialize for NormalizedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("vendor", &self.vendor)?;
        map.serialize_entry("data_type", &self.data_type)?;
        map.serialize_entry("source_type", &self.source_type)?;
        map.serialize_entry("rule_generation", &self.rule_generation)?;
        map.serialize_entry("fields", &FieldsMap(&self.fields))?;
        map.end()
    }
}
