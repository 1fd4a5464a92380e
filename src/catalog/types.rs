//! Canonical catalog types

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized data type (also the entity type a mapping rule targets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Ticker,
    OrderBook,
    Trade,
    Candle,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Ticker,
        DataType::OrderBook,
        DataType::Trade,
        DataType::Candle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ticker => "ticker",
            DataType::OrderBook => "order_book",
            DataType::Trade => "trade",
            DataType::Candle => "candle",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ticker" => Ok(DataType::Ticker),
            "order_book" => Ok(DataType::OrderBook),
            "trade" => Ok(DataType::Trade),
            "candle" => Ok(DataType::Candle),
            other => Err(EngineError::Validation(format!("Unknown data type: {}", other))),
        }
    }
}

/// Declared value type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    Numeric,
    Integer,
    String,
    Boolean,
    Datetime,
    Array,
    Object,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::Numeric => "numeric",
            FieldDataType::Integer => "integer",
            FieldDataType::String => "string",
            FieldDataType::Boolean => "boolean",
            FieldDataType::Datetime => "datetime",
            FieldDataType::Array => "array",
            FieldDataType::Object => "object",
        }
    }
}

impl FromStr for FieldDataType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "numeric" => Ok(FieldDataType::Numeric),
            "integer" => Ok(FieldDataType::Integer),
            "string" => Ok(FieldDataType::String),
            "boolean" => Ok(FieldDataType::Boolean),
            "datetime" => Ok(FieldDataType::Datetime),
            "array" => Ok(FieldDataType::Array),
            "object" => Ok(FieldDataType::Object),
            other => Err(EngineError::Validation(format!("Unknown field data type: {}", other))),
        }
    }
}

/// Grouping of canonical fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Ticker,
    OrderBook,
    Trade,
    Candle,
    Metadata,
    Common,
}

impl FieldCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::Ticker => "ticker",
            FieldCategory::OrderBook => "order_book",
            FieldCategory::Trade => "trade",
            FieldCategory::Candle => "candle",
            FieldCategory::Metadata => "metadata",
            FieldCategory::Common => "common",
        }
    }
}

impl FromStr for FieldCategory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ticker" => Ok(FieldCategory::Ticker),
            "order_book" => Ok(FieldCategory::OrderBook),
            "trade" => Ok(FieldCategory::Trade),
            "candle" => Ok(FieldCategory::Candle),
            "metadata" => Ok(FieldCategory::Metadata),
            "common" => Ok(FieldCategory::Common),
            other => Err(EngineError::Validation(format!("Unknown field category: {}", other))),
        }
    }
}

/// Exchange-agnostic field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub field_name: String,
    pub data_type: FieldDataType,
    pub category: FieldCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CanonicalField {
    pub fn new(field_name: &str, data_type: FieldDataType, category: FieldCategory) -> Self {
        Self {
            field_name: field_name.to_string(),
            data_type,
            category,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// A canonical field as it appears in one data-type template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub field: CanonicalField,
    pub is_required: bool,
}

/// Ordered set of fields a normalized record of one data type must/may contain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTypeTemplate {
    pub data_type: DataType,
    pub fields: Vec<TemplateField>,
}

impl DataTypeTemplate {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            fields: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field_name: &str) -> Option<&TemplateField> {
        self.fields.iter().find(|f| f.field.field_name == field_name)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.get(field_name).is_some()
    }

    /// Names of the required fields, in template order
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_required)
            .map(|f| f.field.field_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_round_trips_through_str() {
        for data_type in DataType::ALL {
            assert_eq!(data_type.as_str().parse::<DataType>().unwrap(), data_type);
        }
        assert!("orderbook".parse::<DataType>().is_err());
    }

    #[test]
    fn test_data_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&DataType::OrderBook).unwrap();
        assert_eq!(json, "\"order_book\"");
    }

    #[test]
    fn test_template_required_fields() {
        let mut template = DataTypeTemplate::new(DataType::Trade);
        template.fields.push(TemplateField {
            field: CanonicalField::new("price", FieldDataType::Numeric, FieldCategory::Trade),
            is_required: true,
        });
        template.fields.push(TemplateField {
            field: CanonicalField::new("sequence", FieldDataType::Integer, FieldCategory::Common),
            is_required: false,
        });

        assert_eq!(template.required_fields().collect::<Vec<_>>(), vec!["price"]);
        assert!(template.contains("sequence"));
        assert!(!template.contains("side"));
    }
}
