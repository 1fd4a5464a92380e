//! Mapping rule types

use super::transform::TransformSpec;
use crate::catalog::DataType;
use crate::error::{EngineError, Result};
use crate::normalization::FieldPath;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Where a payload came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rest,
    #[default]
    Websocket,
    Both,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rest => "rest",
            SourceType::Websocket => "websocket",
            SourceType::Both => "both",
        }
    }

    /// Whether a rule declared for `self` applies to a payload from `requested`
    pub fn applies_to(&self, requested: SourceType) -> bool {
        *self == SourceType::Both || requested == SourceType::Both || *self == requested
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rest" => Ok(SourceType::Rest),
            "websocket" => Ok(SourceType::Websocket),
            "both" => Ok(SourceType::Both),
            other => Err(EngineError::Validation(format!("Unknown source type: {}", other))),
        }
    }
}

fn default_active() -> bool {
    true
}

/// A mapping rule as handed over by a mapping store, not yet validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMappingRule {
    pub mapping_id: i64,
    pub vendor: String,
    pub canonical_field: String,
    pub vendor_field_path: String,
    #[serde(default)]
    pub transformation_spec: Value,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub source_type: SourceType,
    pub entity_type: DataType,
}

/// A validated, immutable mapping rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRule {
    pub mapping_id: i64,
    pub vendor: String,
    pub canonical_field: String,
    #[serde(serialize_with = "serialize_path")]
    pub path: FieldPath,
    pub transform: TransformSpec,
    pub default_value: Option<Value>,
    pub priority: i32,
    pub is_active: bool,
    pub source_type: SourceType,
    pub entity_type: DataType,
}

fn serialize_path<S: Serializer>(path: &FieldPath, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(path.as_str())
}

impl MappingRule {
    /// Validate a raw rule; malformed paths or transformation specs are fatal
    pub fn from_raw(raw: RawMappingRule) -> Result<Self> {
        let id = raw.mapping_id;

        if raw.vendor.trim().is_empty() {
            return Err(EngineError::invalid_spec(id, "vendor is empty"));
        }
        if raw.canonical_field.trim().is_empty() {
            return Err(EngineError::invalid_spec(id, "canonical field is empty"));
        }

        let path = FieldPath::parse(&raw.vendor_field_path)
            .map_err(|e| EngineError::invalid_spec(id, e.to_string()))?;
        let transform = TransformSpec::parse(&raw.transformation_spec)
            .map_err(|reason| EngineError::invalid_spec(id, reason))?;

        Ok(Self {
            mapping_id: id,
            vendor: raw.vendor,
            canonical_field: raw.canonical_field,
            path,
            transform,
            default_value: raw.default_value.filter(|v| !v.is_null()),
            priority: raw.priority,
            is_active: raw.is_active,
            source_type: raw.source_type,
            entity_type: raw.entity_type,
        })
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }
}
