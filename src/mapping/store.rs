//! Rule snapshots and the hot-reloadable rule store

use super::types::{MappingRule, RawMappingRule};
use crate::catalog::{Catalog, DataType};
use crate::error::{EngineError, Result};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Immutable, validated generation of mapping rules
///
/// Active rules are indexed by (vendor, entity type) and kept in resolution
/// order: priority descending, then mapping id ascending.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    generation: u64,
    fingerprint: String,
    rules: Vec<MappingRule>,
    active: HashMap<(String, DataType), Vec<usize>>,
}

impl RuleSnapshot {
    /// Validate raw rules into a snapshot. Any malformed rule fails the whole load.
    pub fn build(generation: u64, raws: Vec<RawMappingRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(raws.len());

        for raw in raws {
            if !seen.insert(raw.mapping_id) {
                return Err(EngineError::invalid_spec(raw.mapping_id, "duplicate mapping id"));
            }
            rules.push(MappingRule::from_raw(raw)?);
        }

        rules.sort_by_key(|r| r.mapping_id);
        let fingerprint = fingerprint(&rules)?;

        let mut active: HashMap<(String, DataType), Vec<usize>> = HashMap::new();
        for (position, rule) in rules.iter().enumerate().filter(|(_, r)| r.is_active) {
            active
                .entry((rule.vendor.clone(), rule.entity_type))
                .or_default()
                .push(position);
        }
        for positions in active.values_mut() {
            positions.sort_by(|a, b| {
                let (a, b) = (&rules[*a], &rules[*b]);
                b.priority
                    .cmp(&a.priority)
                    .then(a.mapping_id.cmp(&b.mapping_id))
            });
        }

        Ok(Self {
            generation,
            fingerprint,
            rules,
            active,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// SHA-256 over the validated rules, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// All rules (active or not), ordered by mapping id
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Active rules for a vendor and entity type, in resolution order
    pub fn active_rules(&self, vendor: &str, entity_type: DataType) -> impl Iterator<Item = &MappingRule> {
        self.active
            .get(&(vendor.to_string(), entity_type))
            .into_iter()
            .flatten()
            .map(move |position| &self.rules[*position])
    }

    /// Vendors with at least one rule, sorted
    pub fn vendors(&self) -> Vec<&str> {
        let mut vendors: Vec<&str> = self.rules.iter().map(|r| r.vendor.as_str()).collect();
        vendors.sort_unstable();
        vendors.dedup();
        vendors
    }

    /// Rules whose canonical field the catalog does not define
    pub fn unknown_fields<'a>(&'a self, catalog: &Catalog) -> Vec<&'a MappingRule> {
        self.rules
            .iter()
            .filter(|r| catalog.field(&r.canonical_field).is_none())
            .collect()
    }
}

fn fingerprint(rules: &[MappingRule]) -> Result<String> {
    let mut hasher = Sha256::new();
    for rule in rules {
        hasher.update(serde_json::to_vec(rule)?);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Holder of the current rule snapshot
///
/// Readers clone the `Arc` once per call and work against that generation;
/// a reload validates the complete new rule set before swapping it in, so a
/// failed reload leaves the previous generation serving.
#[derive(Debug, Default)]
pub struct MappingStore {
    current: RwLock<Arc<RuleSnapshot>>,
}

impl MappingStore {
    /// Create an empty store (generation 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with an initial rule set (generation 1)
    pub fn with_rules(raws: Vec<RawMappingRule>) -> Result<Self> {
        let store = Self::new();
        store.replace(raws)?;
        Ok(store)
    }

    /// Current generation; hold on to it for the duration of a call
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.read().clone()
    }

    /// Validate and install a new rule set, returning its generation
    pub fn replace(&self, raws: Vec<RawMappingRule>) -> Result<u64> {
        let mut snapshot = RuleSnapshot::build(0, raws)?;

        let mut current = self.current.write();
        snapshot.generation = current.generation + 1;
        let generation = snapshot.generation;
        *current = Arc::new(snapshot);

        tracing::info!(
            "Installed mapping rule generation {} ({} rules)",
            generation,
            current.len()
        );
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::fixtures::{rule, RuleExt};

    #[test]
    fn test_active_rules_are_ordered_by_priority_then_id() {
        let snapshot = RuleSnapshot::build(
            1,
            vec![
                rule(5, "bid_price", "b").priority(1),
                rule(2, "bid_price", "bid").priority(10),
                rule(3, "bid_price", "best_bid").priority(10),
                rule(4, "bid_price", "x").priority(50).inactive(),
            ],
        )
        .unwrap();

        let order: Vec<i64> = snapshot
            .active_rules("binance", DataType::Ticker)
            .map(|r| r.mapping_id)
            .collect();
        assert_eq!(order, vec![2, 3, 5]);
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let result = RuleSnapshot::build(1, vec![rule(1, "bid_price", "b"), rule(1, "ask_price", "a")]);
        assert!(matches!(result, Err(EngineError::InvalidMappingSpec { mapping_id: 1, .. })));
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = RuleSnapshot::build(1, vec![rule(1, "bid_price", "b"), rule(2, "ask_price", "a")]).unwrap();
        let b = RuleSnapshot::build(7, vec![rule(2, "ask_price", "a"), rule(1, "bid_price", "b")]).unwrap();
        let c = RuleSnapshot::build(1, vec![rule(1, "bid_price", "bb"), rule(2, "ask_price", "a")]).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_failed_reload_keeps_previous_generation() {
        let store = MappingStore::with_rules(vec![rule(1, "bid_price", "b")]).unwrap();
        assert_eq!(store.snapshot().generation(), 1);

        let held = store.snapshot();
        let result = store.replace(vec![rule(2, "ask_price", "a[")]);
        assert!(result.is_err());
        assert_eq!(store.snapshot().generation(), 1);

        assert_eq!(store.replace(vec![rule(2, "ask_price", "a")]).unwrap(), 2);
        // A reader that took its snapshot earlier still sees the old generation
        assert_eq!(held.generation(), 1);
        assert_eq!(held.rules()[0].mapping_id, 1);
    }

    #[test]
    fn test_unknown_fields() {
        let snapshot = RuleSnapshot::build(
            1,
            vec![rule(1, "bid_price", "b"), rule(2, "vwap", "p")],
        )
        .unwrap();
        let unknown = snapshot.unknown_fields(&Catalog::builtin());
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].canonical_field, "vwap");
    }
}
