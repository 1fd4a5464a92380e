//! SQLite database models

use crate::catalog::DataType;
use crate::mapping::{RawMappingRule, SourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mapping rule being authored; the database assigns its id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMappingRule {
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
    #[serde(default)]
    pub source_type: SourceType,
    pub entity_type: DataType,
}

fn default_active() -> bool {
    true
}

impl NewMappingRule {
    pub fn new(vendor: &str, canonical_field: &str, vendor_field_path: &str, entity_type: DataType) -> Self {
        Self {
            vendor: vendor.to_string(),
            canonical_field: canonical_field.to_string(),
            vendor_field_path: vendor_field_path.to_string(),
            transformation_spec: Value::Null,
            default_value: None,
            priority: 0,
            is_active: true,
            source_type: SourceType::default(),
            entity_type,
        }
    }

    pub(crate) fn to_raw(&self, mapping_id: i64) -> RawMappingRule {
        RawMappingRule {
            mapping_id,
            vendor: self.vendor.clone(),
            canonical_field: self.canonical_field.clone(),
            vendor_field_path: self.vendor_field_path.clone(),
            transformation_spec: self.transformation_spec.clone(),
            default_value: self.default_value.clone(),
            priority: self.priority,
            is_active: self.is_active,
            source_type: self.source_type,
            entity_type: self.entity_type,
        }
    }
}

/// Vendor row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub vendor_id: i64,
    pub vendor_name: String,
    pub display_name: Option<String>,
    pub status: String,
}
