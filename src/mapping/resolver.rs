//! Mapping resolver
//!
//! Narrows a rule snapshot down to the ordered candidates for one canonical
//! field. It never looks at the payload: trying candidates against live data
//! is the orchestrator's job.

use super::store::RuleSnapshot;
use super::types::{MappingRule, SourceType};
use crate::catalog::DataType;
use std::fmt;

/// No active rule exists for a canonical field. Reportable, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoMappingDefined {
    pub vendor: String,
    pub canonical_field: String,
    pub source_type: SourceType,
    pub entity_type: DataType,
}

impl fmt::Display for NoMappingDefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no active mapping for {}.{} ({} {})",
            self.vendor, self.canonical_field, self.entity_type, self.source_type
        )
    }
}

impl std::error::Error for NoMappingDefined {}

/// Candidate selection over one rule snapshot
#[derive(Debug, Clone, Copy)]
pub struct MappingResolver<'a> {
    snapshot: &'a RuleSnapshot,
}

impl<'a> MappingResolver<'a> {
    pub fn new(snapshot: &'a RuleSnapshot) -> Self {
        Self { snapshot }
    }

    /// Active rules for a canonical field whose source type matches (exactly or
    /// via `both`), ordered by priority descending then mapping id ascending.
    pub fn select_rule(
        &self,
        vendor: &str,
        canonical_field: &str,
        source_type: SourceType,
        entity_type: DataType,
    ) -> Result<Vec<&'a MappingRule>, NoMappingDefined> {
        let candidates: Vec<&'a MappingRule> = self
            .snapshot
            .active_rules(vendor, entity_type)
            .filter(|r| r.canonical_field == canonical_field && r.source_type.applies_to(source_type))
            .collect();

        if candidates.is_empty() {
            return Err(NoMappingDefined {
                vendor: vendor.to_string(),
                canonical_field: canonical_field.to_string(),
                source_type,
                entity_type,
            });
        }

        Ok(candidates)
    }

    /// Whether any active rule maps the field for this vendor/entity, from any source
    pub fn has_active_rule(&self, vendor: &str, canonical_field: &str, entity_type: DataType) -> bool {
        self.snapshot
            .active_rules(vendor, entity_type)
            .any(|r| r.canonical_field == canonical_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::fixtures::{rule, RuleExt};

    fn snapshot() -> RuleSnapshot {
        RuleSnapshot::build(
            1,
            vec![
                rule(1, "bid_price", "b").priority(5),
                rule(2, "bid_price", "bids[0][0]").priority(5).source(SourceType::Rest),
                rule(3, "bid_price", "best_bid").priority(9).source(SourceType::Both),
                rule(4, "bid_price", "bb").priority(99).inactive(),
                rule(5, "ask_price", "a").entity(DataType::OrderBook),
                rule(6, "bid_price", "bid").vendor("kraken"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_select_filters_and_orders() {
        let snapshot = snapshot();
        let resolver = MappingResolver::new(&snapshot);

        let ids: Vec<i64> = resolver
            .select_rule("binance", "bid_price", SourceType::Websocket, DataType::Ticker)
            .unwrap()
            .iter()
            .map(|r| r.mapping_id)
            .collect();
        assert_eq!(ids, vec![3, 1]);

        let ids: Vec<i64> = resolver
            .select_rule("binance", "bid_price", SourceType::Rest, DataType::Ticker)
            .unwrap()
            .iter()
            .map(|r| r.mapping_id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_equal_priority_breaks_ties_by_id() {
        let snapshot = RuleSnapshot::build(
            1,
            vec![rule(8, "bid_price", "x").priority(3), rule(7, "bid_price", "y").priority(3)],
        )
        .unwrap();
        let candidates = MappingResolver::new(&snapshot)
            .select_rule("binance", "bid_price", SourceType::Websocket, DataType::Ticker)
            .unwrap();
        assert_eq!(candidates[0].mapping_id, 7);
    }

    #[test]
    fn test_no_mapping_defined() {
        let snapshot = snapshot();
        let resolver = MappingResolver::new(&snapshot);

        let err = resolver
            .select_rule("binance", "ask_price", SourceType::Websocket, DataType::Ticker)
            .unwrap_err();
        assert_eq!(err.canonical_field, "ask_price");
        assert!(err.to_string().contains("binance.ask_price"));

        assert!(resolver.has_active_rule("binance", "ask_price", DataType::OrderBook));
        assert!(!resolver.has_active_rule("coinbase", "bid_price", DataType::Ticker));
    }
}
