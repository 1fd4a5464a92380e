//! Engine state
//!
//! Wires configuration, the SQLite mapping store, the catalog, the hot
//! reloadable rule store and the coverage tracker together.

use crate::catalog::{Catalog, DataType};
use crate::config::EngineConfig;
use crate::coverage::{self, CoverageReport, CoverageTracker};
use crate::db::sqlite::SqliteDb;
use crate::error::{EngineError, Result};
use crate::mapping::{MappingStore, RawMappingRule, SourceType};
use crate::normalization::{NormalizationEngine, NormalizedRecord};
use serde_json::Value;
use std::sync::Arc;

/// Shared engine state
pub struct EngineState {
    pub config: EngineConfig,

    /// SQLite mapping store, when configured
    pub sqlite: Option<Arc<SqliteDb>>,

    pub catalog: Arc<Catalog>,

    /// Current rule generation
    pub rules: Arc<MappingStore>,

    /// Dynamic coverage over everything normalized through this state
    pub coverage: CoverageTracker,

    engine: NormalizationEngine,
}

impl EngineState {
    /// Build state from configuration, opening the database if one is configured
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let sqlite = match &config.database_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!("Mapping store: {:?}", path);
                Some(Arc::new(SqliteDb::new(path)?))
            }
            None => None,
        };

        let catalog = match &sqlite {
            Some(db) => {
                if config.seed_default_catalog && !db.has_catalog()? {
                    db.seed_catalog(&Catalog::builtin())?;
                }
                db.load_catalog()?
            }
            None => Catalog::builtin(),
        };

        let state = Self::assemble(config, sqlite, catalog);
        if state.sqlite.is_some() {
            state.reload_rules()?;
        }
        Ok(state)
    }

    /// State with no database, the builtin catalog and the given rules
    pub fn in_memory(config: EngineConfig, rules: Vec<RawMappingRule>) -> Result<Self> {
        let state = Self::assemble(config, None, Catalog::builtin());
        state.install(rules)?;
        Ok(state)
    }

    fn assemble(config: EngineConfig, sqlite: Option<Arc<SqliteDb>>, catalog: Catalog) -> Self {
        let catalog = Arc::new(catalog);
        let rules = Arc::new(MappingStore::new());
        let engine = NormalizationEngine::new(catalog.clone(), rules.clone())
            .with_derived_exchange(config.derive_exchange_field);

        Self {
            config,
            sqlite,
            catalog,
            rules,
            coverage: CoverageTracker::new(),
            engine,
        }
    }

    /// Reload every rule from the database. On failure the previous generation stays.
    pub fn reload_rules(&self) -> Result<u64> {
        let db = self
            .sqlite
            .as_ref()
            .ok_or_else(|| EngineError::Config("no mapping database configured".to_string()))?;
        self.install(db.load_mapping_rules(None)?)
    }

    /// Validate and install a rule set supplied by the caller
    pub fn install(&self, rules: Vec<RawMappingRule>) -> Result<u64> {
        let generation = self.rules.replace(rules)?;

        let snapshot = self.rules.snapshot();
        for rule in snapshot.unknown_fields(&self.catalog) {
            tracing::warn!(
                "Mapping {} targets unknown canonical field {}",
                rule.mapping_id,
                rule.canonical_field
            );
        }

        Ok(generation)
    }

    pub fn engine(&self) -> &NormalizationEngine {
        &self.engine
    }

    /// Normalize a payload and feed the coverage tracker
    pub fn normalize(
        &self,
        vendor: &str,
        data_type: DataType,
        source_type: Option<SourceType>,
        payload: &Value,
    ) -> NormalizedRecord {
        let source_type = source_type.unwrap_or(self.config.default_source_type);
        let record = self.engine.normalize(vendor, data_type, source_type, payload);
        self.coverage.observe(&record);
        record
    }

    /// Static coverage for one vendor and data type
    pub fn coverage_report(&self, vendor: &str, data_type: DataType) -> CoverageReport {
        coverage::compute_coverage(&self.catalog, &self.rules.snapshot(), vendor, data_type)
    }

    /// Static coverage for every template of one vendor
    pub fn vendor_coverage(&self, vendor: &str) -> Vec<CoverageReport> {
        coverage::vendor_coverage(&self.catalog, &self.rules.snapshot(), vendor)
    }

    /// Dynamic coverage from records normalized through this state
    pub fn observed_coverage(&self, vendor: &str, data_type: DataType) -> CoverageReport {
        self.coverage.report(&self.catalog, vendor, data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::NewMappingRule;
    use crate::mapping::fixtures::rule;
    use crate::normalization::FieldOutcome;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_open_seeds_catalog_and_loads_rules() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            database_path: Some(dir.path().join("data").join("rules.db")),
            ..Default::default()
        };

        let state = EngineState::open(config.clone()).unwrap();
        assert_eq!(state.catalog.templates().len(), 4);
        assert_eq!(state.rules.snapshot().generation(), 1);

        let db = state.sqlite.clone().unwrap();
        let mut bid = NewMappingRule::new("binance", "bid_price", "b", DataType::Ticker);
        bid.transformation_spec = json!({"op": "to_number"});
        db.insert_mapping_rule(&bid).unwrap();
        assert_eq!(state.reload_rules().unwrap(), 2);

        let record = state.normalize("binance", DataType::Ticker, None, &json!({"b": "43210.5"}));
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));
        assert_eq!(state.observed_coverage("binance", DataType::Ticker).fields_mapped, 1);
        assert_eq!(state.coverage_report("binance", DataType::Ticker).fields_mapped, 1);
        drop(state);

        // Reopening does not duplicate the catalog and sees the stored rule
        let state = EngineState::open(config).unwrap();
        assert_eq!(state.rules.snapshot().len(), 1);
    }

    #[test]
    fn test_failed_install_keeps_serving() {
        let state = EngineState::in_memory(EngineConfig::default(), vec![rule(1, "bid_price", "b")]).unwrap();
        assert!(state.reload_rules().is_err());

        let mut bad = rule(2, "bid_price", "b");
        bad.transformation_spec = json!({"op": "nope"});
        assert!(state.install(vec![bad]).is_err());

        let record = state.normalize("binance", DataType::Ticker, None, &json!({"b": "1"}));
        assert_eq!(record.rule_generation, 1);
        assert_eq!(record.outcome("bid_price"), Some(FieldOutcome::Resolved));
    }

    #[test]
    fn test_config_controls_derived_exchange() {
        let config = EngineConfig {
            derive_exchange_field: false,
            ..Default::default()
        };
        let state = EngineState::in_memory(config, Vec::new()).unwrap();
        let record = state.normalize("kraken", DataType::Trade, Some(SourceType::Rest), &json!({}));
        assert_eq!(record.outcome("exchange"), Some(FieldOutcome::Missing));
        assert_eq!(state.vendor_coverage("kraken").len(), 4);
    }
}
