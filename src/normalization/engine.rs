//! Normalization orchestrator
//!
//! Drives path resolution and the transformation pipeline for every canonical
//! field of a data-type template. A call takes one rule snapshot up front and
//! uses it throughout, so a concurrent reload never mixes two generations.

use super::pipeline;
use super::record::{FieldDiagnostic, FieldOutcome, FieldResult, NormalizedRecord, RecordField};
use super::value::CanonicalValue;
use crate::catalog::{Catalog, DataType, TemplateField};
use crate::mapping::{MappingResolver, MappingRule, MappingStore, RuleSnapshot, SourceType};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Field filled from the vendor name when no rule supplies it
const EXCHANGE_FIELD: &str = "exchange";

/// Turns vendor payloads into canonical records
#[derive(Debug, Clone)]
pub struct NormalizationEngine {
    catalog: Arc<Catalog>,
    rules: Arc<MappingStore>,
    derive_exchange: bool,
}

impl NormalizationEngine {
    pub fn new(catalog: Arc<Catalog>, rules: Arc<MappingStore>) -> Self {
        Self {
            catalog,
            rules,
            derive_exchange: true,
        }
    }

    /// Enable or disable filling `exchange` from the vendor name
    pub fn with_derived_exchange(mut self, enabled: bool) -> Self {
        self.derive_exchange = enabled;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &MappingStore {
        &self.rules
    }

    /// Normalize one payload against the current rule generation.
    ///
    /// Never fails: every template field gets an outcome, and a data type with
    /// no template yields a record with no fields.
    pub fn normalize(
        &self,
        vendor: &str,
        data_type: DataType,
        source_type: SourceType,
        payload: &Value,
    ) -> NormalizedRecord {
        let snapshot = self.rules.snapshot();
        self.normalize_with(&snapshot, vendor, data_type, source_type, payload)
    }

    /// Normalize every element of a top-level array payload (a single record
    /// otherwise). All records come from the same rule generation.
    pub fn normalize_many(
        &self,
        vendor: &str,
        data_type: DataType,
        source_type: SourceType,
        payload: &Value,
    ) -> Vec<NormalizedRecord> {
        let snapshot = self.rules.snapshot();
        match payload {
            Value::Array(items) => items
                .iter()
                .map(|item| self.normalize_with(&snapshot, vendor, data_type, source_type, item))
                .collect(),
            other => vec![self.normalize_with(&snapshot, vendor, data_type, source_type, other)],
        }
    }

    fn normalize_with(
        &self,
        snapshot: &RuleSnapshot,
        vendor: &str,
        data_type: DataType,
        source_type: SourceType,
        payload: &Value,
    ) -> NormalizedRecord {
        let resolver = MappingResolver::new(snapshot);
        let fields = match self.catalog.template(data_type) {
            Some(template) => template
                .fields
                .iter()
                .map(|field| RecordField {
                    field_name: field.field.field_name.clone(),
                    is_required: field.is_required,
                    result: self.resolve_field(&resolver, vendor, field, source_type, data_type, payload),
                })
                .collect(),
            None => {
                tracing::warn!("No template defined for data type {}", data_type);
                Vec::new()
            }
        };

        let record = NormalizedRecord {
            vendor: vendor.to_string(),
            data_type,
            source_type,
            rule_generation: snapshot.generation(),
            fields,
        };

        tracing::debug!(
            "Normalized {} {} ({}): {} resolved, {} defaulted, {} missing, {} failed",
            vendor,
            data_type,
            source_type,
            record.count(FieldOutcome::Resolved),
            record.count(FieldOutcome::Defaulted),
            record.count(FieldOutcome::Missing),
            record.count(FieldOutcome::TransformFailed)
        );

        let missing = record.missing_required();
        if !missing.is_empty() {
            tracing::warn!(
                "{} {} record is missing required fields: {}",
                vendor,
                data_type,
                missing.join(", ")
            );
        }

        record
    }

    fn resolve_field(
        &self,
        resolver: &MappingResolver<'_>,
        vendor: &str,
        field: &TemplateField,
        source_type: SourceType,
        data_type: DataType,
        payload: &Value,
    ) -> FieldResult {
        let field_name = field.field.field_name.as_str();

        let result = match resolver.select_rule(vendor, field_name, source_type, data_type) {
            Ok(candidates) => match pick_candidate(&candidates, payload) {
                Some((rule, raw)) => {
                    let out = pipeline::apply(
                        raw,
                        &rule.transform,
                        rule.default_value.as_ref(),
                        field.field.data_type,
                    );
                    let diagnostic = match out.failure {
                        Some(failure) => Some(FieldDiagnostic::TransformFailed {
                            mapping_id: rule.mapping_id,
                            op: failure.op,
                            reason: failure.reason,
                        }),
                        None if out.outcome == FieldOutcome::Missing => Some(FieldDiagnostic::EmptyValue {
                            mapping_id: rule.mapping_id,
                        }),
                        None => None,
                    };
                    FieldResult {
                        value: out.value,
                        outcome: out.outcome,
                        mapping_id: Some(rule.mapping_id),
                        diagnostic,
                    }
                }
                None => FieldResult::missing(FieldDiagnostic::PathAbsent {
                    tried: candidates.iter().map(|r| r.mapping_id).collect(),
                }),
            },
            Err(_) => FieldResult::missing(FieldDiagnostic::NoMappingDefined),
        };

        if self.derive_exchange && field_name == EXCHANGE_FIELD && result.outcome == FieldOutcome::Missing {
            return FieldResult {
                value: Some(CanonicalValue::Text(vendor.to_string())),
                outcome: FieldOutcome::Defaulted,
                mapping_id: None,
                diagnostic: Some(FieldDiagnostic::DerivedFromContext),
            };
        }

        result
    }

    /// Report how every candidate rule fares against a payload, without
    /// transforming anything
    pub fn trace_mappings(
        &self,
        vendor: &str,
        data_type: DataType,
        source_type: SourceType,
        payload: &Value,
    ) -> MappingTrace {
        let snapshot = self.rules.snapshot();

        let entries: Vec<TraceEntry> = snapshot
            .active_rules(vendor, data_type)
            .filter(|rule| rule.source_type.applies_to(source_type))
            .map(|rule| {
                let raw = present(rule.path.resolve(payload));
                TraceEntry {
                    mapping_id: rule.mapping_id,
                    canonical_field: rule.canonical_field.clone(),
                    vendor_field_path: rule.path.as_str().to_string(),
                    priority: rule.priority,
                    resolved: raw.is_some(),
                    raw_value: raw.cloned(),
                }
            })
            .collect();

        let applied = entries.iter().filter(|e| e.resolved).count();

        MappingTrace {
            vendor: vendor.to_string(),
            data_type,
            source_type,
            rule_generation: snapshot.generation(),
            applied,
            missed: entries.len() - applied,
            entries,
        }
    }
}

/// First candidate whose path resolves, else the first one carrying a default
fn pick_candidate<'r, 'p>(
    candidates: &[&'r MappingRule],
    payload: &'p Value,
) -> Option<(&'r MappingRule, Option<&'p Value>)> {
    candidates
        .iter()
        .find_map(|rule| present(rule.path.resolve(payload)).map(|raw| (*rule, Some(raw))))
        .or_else(|| {
            candidates
                .iter()
                .find(|rule| rule.has_default())
                .map(|rule| (*rule, None))
        })
}

/// A JSON `null` counts as absent
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// How one candidate rule fared against a payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub mapping_id: i64,
    pub canonical_field: String,
    pub vendor_field_path: String,
    pub priority: i32,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<Value>,
}

/// Per-rule resolution report for one payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingTrace {
    pub vendor: String,
    pub data_type: DataType,
    pub source_type: SourceType,
    pub rule_generation: u64,
    pub entries: Vec<TraceEntry>,
    pub applied: usize,
    pub missed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::fixtures::{rule, RuleExt};
    use crate::mapping::RawMappingRule;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn engine(rules: Vec<RawMappingRule>) -> NormalizationEngine {
        NormalizationEngine::new(
            Arc::new(Catalog::builtin()),
            Arc::new(MappingStore::with_rules(rules).unwrap()),
        )
    }

    fn ticker(engine: &NormalizationEngine, payload: Value) -> NormalizedRecord {
        engine.normalize("binance", DataType::Ticker, SourceType::Websocket, &payload)
    }

    #[test]
    fn test_named_key_resolves() {
        let engine = engine(vec![rule(1, "bid_price", "best_bid")]);
        let record = ticker(&engine, json!({"price": "43210.50", "best_bid": "43210.00"}));

        let bid = record.get("bid_price").unwrap();
        assert_eq!(bid.outcome, FieldOutcome::Resolved);
        assert_eq!(bid.value, Some(CanonicalValue::Number(dec!(43210.00))));
        assert_eq!(bid.mapping_id, Some(1));
    }

    #[test]
    fn test_positional_path_with_to_number() {
        let engine = engine(vec![rule(1, "bid_price", "a[0]").spec(json!({"op": "to_number"}))]);
        let record = ticker(&engine, json!({"a": ["43210.00", "0.5"]}));

        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));
        assert_eq!(record.value("bid_price"), Some(&CanonicalValue::Number(dec!(43210.0))));
    }

    #[test]
    fn test_default_applies_when_key_absent() {
        let engine = engine(vec![rule(1, "sequence", "sequence").default_value(json!("0"))]);
        let record = ticker(&engine, json!({"b": "1"}));

        assert_eq!(record.outcome("sequence"), Some(FieldOutcome::Defaulted));
        assert_eq!(record.value("sequence"), Some(&CanonicalValue::Integer(0)));
    }

    #[test]
    fn test_scale_fixed_point() {
        let engine = engine(vec![
            rule(1, "last_price", "p").spec(json!({"op": "scale", "factor": 0.00000001}))
        ]);
        let record = ticker(&engine, json!({"p": "100000000"}));

        assert_eq!(record.outcome("last_price"), Some(FieldOutcome::Resolved));
        assert_eq!(record.value("last_price"), Some(&CanonicalValue::Number(dec!(1.0))));
    }

    #[test]
    fn test_unmapped_field_is_no_mapping_defined() {
        let engine = engine(vec![rule(1, "bid_price", "b")]);
        let record = ticker(&engine, json!({"b": "1", "a": "2"}));

        let ask = record.get("ask_price").unwrap();
        assert_eq!(ask.outcome, FieldOutcome::Missing);
        assert_eq!(ask.diagnostic, Some(FieldDiagnostic::NoMappingDefined));
        assert!(ask.value.is_none());
        assert!(record.missing_required().contains(&"ask_price"));
        assert!(!record.is_complete());
    }

    #[test]
    fn test_unresolved_path_lists_tried_rules() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").priority(2),
            rule(2, "bid_price", "bid").priority(1),
        ]);
        let record = ticker(&engine, json!({"a": "1"}));

        assert_eq!(
            record.get("bid_price").unwrap().diagnostic,
            Some(FieldDiagnostic::PathAbsent { tried: vec![1, 2] })
        );
    }

    #[test]
    fn test_higher_priority_rule_wins_when_both_resolve() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").priority(1),
            rule(2, "bid_price", "best_bid").priority(10),
        ]);
        let record = ticker(&engine, json!({"b": "1.5", "best_bid": "2.5"}));

        assert_eq!(record.get("bid_price").unwrap().mapping_id, Some(2));
        assert_eq!(record.value("bid_price"), Some(&CanonicalValue::Number(dec!(2.5))));
    }

    #[test]
    fn test_falls_through_to_lower_priority_path() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").priority(1),
            rule(2, "bid_price", "best_bid").priority(10).default_value(json!("9")),
        ]);

        // Resolving path beats a higher-priority default
        let record = ticker(&engine, json!({"b": "1.5"}));
        assert_eq!(record.get("bid_price").unwrap().mapping_id, Some(1));
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));

        let record = ticker(&engine, json!({}));
        assert_eq!(record.get("bid_price").unwrap().mapping_id, Some(2));
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Defaulted));
    }

    #[test]
    fn test_default_on_array_extract_rule() {
        let engine = engine(vec![rule(1, "bid_price", "b")
            .spec(json!({"type": "array_extract", "index": 0, "subtype": "string_to_numeric"}))
            .default_value(json!("0"))]);

        let record = ticker(&engine, json!({}));
        let bid = record.get("bid_price").unwrap();
        assert_eq!(bid.outcome, FieldOutcome::Defaulted);
        assert_eq!(bid.value, Some(CanonicalValue::Number(dec!(0))));
        assert_eq!(bid.diagnostic, None);

        let record = ticker(&engine, json!({"b": ["43210.5", "2"]}));
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));
        assert_eq!(record.value("bid_price"), Some(&CanonicalValue::Number(dec!(43210.5))));
    }

    #[test]
    fn test_empty_required_value_is_missing() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").spec(json!({"op": "to_number"})),
            rule(2, "ask_price", "a").spec(json!({"op": "to_number"})).default_value(json!("0")),
        ]);
        let record = ticker(&engine, json!({"b": "", "a": ""}));

        let bid = record.get("bid_price").unwrap();
        assert_eq!(bid.outcome, FieldOutcome::Missing);
        assert!(bid.value.is_none());
        assert_eq!(bid.diagnostic, Some(FieldDiagnostic::EmptyValue { mapping_id: 1 }));
        assert!(record.missing_required().contains(&"bid_price"));
        assert!(!record.is_complete());

        assert_eq!(record.outcome("ask_price"), Some(FieldOutcome::Defaulted));
        assert_eq!(record.value("ask_price"), Some(&CanonicalValue::Number(dec!(0))));
    }

    #[test]
    fn test_transform_failure_is_localized() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").spec(json!({"op": "to_number"})),
            rule(2, "ask_price", "a").spec(json!({"op": "to_number"})),
        ]);
        let record = ticker(&engine, json!({"b": "n/a", "a": "43210.5"}));

        let bid = record.get("bid_price").unwrap();
        assert_eq!(bid.outcome, FieldOutcome::TransformFailed);
        assert!(bid.value.is_none());
        assert!(matches!(
            bid.diagnostic,
            Some(FieldDiagnostic::TransformFailed { mapping_id: 1, ref op, .. }) if op == "to_number"
        ));

        assert_eq!(record.outcome("ask_price"), Some(FieldOutcome::Resolved));
        assert_eq!(record.failed_fields(), vec!["bid_price"]);
        // Every template field still has an outcome
        assert_eq!(record.fields.len(), 14);
    }

    #[test]
    fn test_source_type_filtering() {
        let engine = engine(vec![
            rule(1, "bid_price", "bids[0][0]").source(SourceType::Rest),
            rule(2, "bid_price", "b"),
        ]);
        let payload = json!({"b": "1", "bids": [["2", "3"]]});

        let ws = engine.normalize("binance", DataType::Ticker, SourceType::Websocket, &payload);
        assert_eq!(ws.get("bid_price").unwrap().mapping_id, Some(2));

        let rest = engine.normalize("binance", DataType::Ticker, SourceType::Rest, &payload);
        assert_eq!(rest.get("bid_price").unwrap().mapping_id, Some(1));
    }

    #[test]
    fn test_exchange_derived_from_vendor() {
        let engine = engine(Vec::new());
        let record = ticker(&engine, json!({}));

        let exchange = record.get("exchange").unwrap();
        assert_eq!(exchange.outcome, FieldOutcome::Defaulted);
        assert_eq!(exchange.value, Some(CanonicalValue::Text("binance".to_string())));
        assert_eq!(exchange.diagnostic, Some(FieldDiagnostic::DerivedFromContext));

        let engine = engine.with_derived_exchange(false);
        let record = ticker(&engine, json!({}));
        assert_eq!(record.outcome("exchange"), Some(FieldOutcome::Missing));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let engine = engine(vec![
            rule(1, "bid_price", "b"),
            rule(2, "timestamp", "E").spec(json!({"op": "epoch_to_datetime", "unit": "ms"})),
            rule(3, "symbol", "s"),
        ]);
        let payload = json!({"b": "43210.00", "E": 1700000000000i64, "s": "BTCUSDT"});

        let first = serde_json::to_vec(&ticker(&engine, payload.clone())).unwrap();
        let second = serde_json::to_vec(&ticker(&engine, payload)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_carries_rule_generation() {
        let engine = engine(vec![rule(1, "bid_price", "b")]);
        assert_eq!(ticker(&engine, json!({})).rule_generation, 1);

        engine.rules().replace(vec![rule(1, "bid_price", "bid")]).unwrap();
        let record = ticker(&engine, json!({"bid": "2"}));
        assert_eq!(record.rule_generation, 2);
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));
    }

    #[test]
    fn test_concurrent_normalize_during_reload() {
        let engine = engine(vec![rule(1, "bid_price", "b"), rule(2, "ask_price", "a")]);
        let payload = json!({"b": "1", "a": "2", "bid": "3", "ask": "4"});

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let record = ticker(&engine, payload.clone());
                        // Each generation maps both fields through the same key style
                        let ids = (
                            record.get("bid_price").unwrap().mapping_id,
                            record.get("ask_price").unwrap().mapping_id,
                        );
                        if record.rule_generation % 2 == 1 {
                            assert_eq!(ids, (Some(1), Some(2)));
                        } else {
                            assert_eq!(ids, (Some(3), Some(4)));
                        }
                    }
                });
            }

            scope.spawn(|| {
                for generation in 2..50u64 {
                    let rules = if generation % 2 == 1 {
                        vec![rule(1, "bid_price", "b"), rule(2, "ask_price", "a")]
                    } else {
                        vec![rule(3, "bid_price", "bid"), rule(4, "ask_price", "ask")]
                    };
                    assert_eq!(engine.rules().replace(rules).unwrap(), generation);
                }
            });
        });
    }

    #[test]
    fn test_normalize_many_uses_array_elements() {
        let engine = NormalizationEngine::new(
            Arc::new(Catalog::builtin()),
            Arc::new(
                MappingStore::with_rules(vec![
                    rule(1, "price", "p").entity(DataType::Trade),
                    rule(2, "side", "S").entity(DataType::Trade).spec(json!({"op": "string_upper_to_enum"})),
                ])
                .unwrap(),
            ),
        );
        let payload = json!([{"p": "1.5", "S": "buy"}, {"p": "2.5", "S": "sell"}]);

        let records = engine.normalize_many("binance", DataType::Trade, SourceType::Websocket, &payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value("price"), Some(&CanonicalValue::Number(dec!(2.5))));
        assert_eq!(records[0].value("side"), Some(&CanonicalValue::Text("BUY".to_string())));

        let single = engine.normalize_many("binance", DataType::Trade, SourceType::Websocket, &json!({"p": "3"}));
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_trace_mappings() {
        let engine = engine(vec![
            rule(1, "bid_price", "b").priority(5),
            rule(2, "ask_price", "a"),
            rule(3, "last_price", "c").source(SourceType::Rest),
        ]);
        let trace = engine.trace_mappings("binance", DataType::Ticker, SourceType::Websocket, &json!({"b": "1"}));

        assert_eq!(trace.entries.len(), 2);
        assert_eq!(trace.applied, 1);
        assert_eq!(trace.missed, 1);
        assert_eq!(trace.entries[0].mapping_id, 1);
        assert_eq!(trace.entries[0].raw_value, Some(json!("1")));
        assert!(!trace.entries[1].resolved);
    }
}
