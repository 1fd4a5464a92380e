//! Canonical field catalog
//!
//! Immutable reference data: the canonical fields every vendor payload is
//! normalized into, and the per-data-type templates listing which of them a
//! record must or may contain. Built once (from the builtin defaults or the
//! SQLite store) and shared read-only afterwards.

mod types;

pub use types::{
    CanonicalField, DataType, DataTypeTemplate, FieldCategory, FieldDataType, TemplateField,
};

use crate::error::{EngineError, Result};
use std::collections::HashMap;

/// Canonical fields plus data-type templates
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    fields: HashMap<String, CanonicalField>,
    templates: HashMap<DataType, DataTypeTemplate>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canonical field; the first definition of a name wins
    pub fn add_field(&mut self, field: CanonicalField) -> bool {
        if self.fields.contains_key(&field.field_name) {
            return false;
        }
        self.fields.insert(field.field_name.clone(), field);
        true
    }

    /// Define (or replace) the template for a data type from `(field_name, is_required)` pairs
    pub fn set_template(&mut self, data_type: DataType, fields: &[(&str, bool)]) -> Result<()> {
        let mut template = DataTypeTemplate::new(data_type);

        for (field_name, is_required) in fields {
            let field = self.fields.get(*field_name).ok_or_else(|| {
                EngineError::Validation(format!(
                    "Template '{}' references unknown canonical field '{}'",
                    data_type, field_name
                ))
            })?;

            if template.contains(field_name) {
                return Err(EngineError::Validation(format!(
                    "Template '{}' lists field '{}' twice",
                    data_type, field_name
                )));
            }

            template.fields.push(TemplateField {
                field: field.clone(),
                is_required: *is_required,
            });
        }

        self.templates.insert(data_type, template);
        Ok(())
    }

    pub fn field(&self, field_name: &str) -> Option<&CanonicalField> {
        self.fields.get(field_name)
    }

    pub fn template(&self, data_type: DataType) -> Option<&DataTypeTemplate> {
        self.templates.get(&data_type)
    }

    /// All fields, sorted by name
    pub fn fields(&self) -> Vec<&CanonicalField> {
        let mut fields: Vec<_> = self.fields.values().collect();
        fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        fields
    }

    /// All templates in `DataType` order
    pub fn templates(&self) -> Vec<&DataTypeTemplate> {
        DataType::ALL
            .iter()
            .filter_map(|dt| self.templates.get(dt))
            .collect()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The default catalog: core ticker, order book, trade and candle fields
    pub fn builtin() -> Self {
        use FieldCategory as C;
        use FieldDataType as T;

        let definitions: &[(&str, T, C, &str)] = &[
            // Ticker
            ("bid_price", T::Numeric, C::Ticker, "Current best bid price"),
            ("ask_price", T::Numeric, C::Ticker, "Current best ask price"),
            ("last_price", T::Numeric, C::Ticker, "Price of last trade"),
            ("volume_24h", T::Numeric, C::Ticker, "24-hour trading volume"),
            ("high_24h", T::Numeric, C::Ticker, "24-hour highest price"),
            ("low_24h", T::Numeric, C::Ticker, "24-hour lowest price"),
            ("open_24h", T::Numeric, C::Ticker, "24-hour opening price"),
            ("volume_30d", T::Numeric, C::Ticker, "30-day trading volume"),
            ("best_bid_size", T::Numeric, C::Ticker, "Size at best bid"),
            ("best_ask_size", T::Numeric, C::Ticker, "Size at best ask"),
            // Order book
            ("bid_size", T::Numeric, C::OrderBook, "Bid size at price level"),
            ("ask_size", T::Numeric, C::OrderBook, "Ask size at price level"),
            // Trade
            ("trade_id", T::String, C::Trade, "Unique trade identifier"),
            ("price", T::Numeric, C::Trade, "Trade price"),
            ("size", T::Numeric, C::Trade, "Trade size/volume"),
            ("side", T::String, C::Trade, "Trade side (buy/sell)"),
            // Candle
            ("open", T::Numeric, C::Candle, "Opening price"),
            ("high", T::Numeric, C::Candle, "Highest price"),
            ("low", T::Numeric, C::Candle, "Lowest price"),
            ("close", T::Numeric, C::Candle, "Closing price"),
            ("volume", T::Numeric, C::Candle, "Trading volume"),
            ("interval", T::Integer, C::Candle, "Candle interval in seconds"),
            // Common metadata
            ("symbol", T::String, C::Common, "Trading pair symbol"),
            ("timestamp", T::Datetime, C::Common, "Data timestamp"),
            ("sequence", T::Integer, C::Common, "Message sequence number"),
            ("exchange", T::String, C::Common, "Exchange name"),
        ];

        let mut catalog = Catalog::new();
        for (name, data_type, category, description) in definitions {
            catalog.add_field(CanonicalField::new(name, *data_type, *category).with_description(description));
        }

        for (data_type, fields) in builtin_templates() {
            // Every name above is defined, so this cannot fail
            if let Err(e) = catalog.set_template(data_type, fields) {
                tracing::error!("Builtin template {} is inconsistent: {}", data_type, e);
            }
        }

        catalog
    }
}

fn builtin_templates() -> [(DataType, &'static [(&'static str, bool)]); 4] {
    [
        (
            DataType::Ticker,
            &[
                ("bid_price", true),
                ("ask_price", true),
                ("last_price", true),
                ("volume_24h", true),
                ("high_24h", false),
                ("low_24h", false),
                ("open_24h", false),
                ("volume_30d", false),
                ("best_bid_size", false),
                ("best_ask_size", false),
                ("symbol", true),
                ("timestamp", true),
                ("sequence", false),
                ("exchange", true),
            ],
        ),
        (
            DataType::OrderBook,
            &[
                ("bid_price", true),
                ("bid_size", true),
                ("ask_price", true),
                ("ask_size", true),
                ("timestamp", true),
                ("sequence", false),
                ("symbol", true),
                ("exchange", true),
            ],
        ),
        (
            DataType::Trade,
            &[
                ("trade_id", true),
                ("price", true),
                ("size", true),
                ("side", true),
                ("timestamp", true),
                ("symbol", true),
                ("exchange", true),
            ],
        ),
        (
            DataType::Candle,
            &[
                ("open", true),
                ("high", true),
                ("low", true),
                ("close", true),
                ("volume", true),
                ("timestamp", true),
                ("interval", true),
                ("symbol", true),
                ("exchange", true),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_has_all_templates() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.templates().len(), 4);

        let ticker = catalog.template(DataType::Ticker).unwrap();
        assert_eq!(ticker.fields[0].field.field_name, "bid_price");
        assert!(ticker.get("bid_price").unwrap().is_required);
        assert!(!ticker.get("high_24h").unwrap().is_required);

        let candle = catalog.template(DataType::Candle).unwrap();
        assert_eq!(candle.get("interval").unwrap().field.data_type, FieldDataType::Integer);
    }

    #[test]
    fn test_first_definition_wins() {
        let mut catalog = Catalog::new();
        assert!(catalog.add_field(CanonicalField::new(
            "timestamp",
            FieldDataType::Datetime,
            FieldCategory::Common
        )));
        assert!(!catalog.add_field(CanonicalField::new(
            "timestamp",
            FieldDataType::String,
            FieldCategory::Trade
        )));
        assert_eq!(catalog.field("timestamp").unwrap().data_type, FieldDataType::Datetime);
    }

    #[test]
    fn test_template_rejects_unknown_field() {
        let mut catalog = Catalog::new();
        let result = catalog.set_template(DataType::Trade, &[("price", true)]);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_template_rejects_duplicate_field() {
        let mut catalog = Catalog::new();
        catalog.add_field(CanonicalField::new("price", FieldDataType::Numeric, FieldCategory::Trade));
        let result = catalog.set_template(DataType::Trade, &[("price", true), ("price", false)]);
        assert!(result.is_err());
    }
}
