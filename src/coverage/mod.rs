//! Coverage calculator
//!
//! Static coverage counts the template fields that have at least one active
//! rule for a vendor (any source type). Dynamic coverage counts the fields a
//! rule actually produced a value for in observed records. Neither is an
//! error condition: an empty template or no rules is simply 0%.

use crate::catalog::{Catalog, DataType, DataTypeTemplate};
use crate::mapping::{MappingResolver, RuleSnapshot};
use crate::normalization::NormalizedRecord;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Coverage of one data-type template for one vendor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub vendor: String,
    pub data_type: DataType,
    pub fields_defined: usize,
    pub fields_mapped: usize,
    /// Percentage, rounded to two decimal places
    pub coverage_percent: Decimal,
    /// Template fields not counted as mapped, in template order
    pub unmapped_fields: Vec<String>,
}

impl CoverageReport {
    fn build(
        vendor: &str,
        data_type: DataType,
        template: Option<&DataTypeTemplate>,
        is_mapped: impl Fn(&str) -> bool,
    ) -> Self {
        let names: Vec<&str> = template
            .map(|t| t.fields.iter().map(|f| f.field.field_name.as_str()).collect())
            .unwrap_or_default();

        let (mapped, unmapped): (Vec<&str>, Vec<&str>) = names.iter().copied().partition(|name| is_mapped(name));

        Self {
            vendor: vendor.to_string(),
            data_type,
            fields_defined: names.len(),
            fields_mapped: mapped.len(),
            coverage_percent: percent(mapped.len(), names.len()),
            unmapped_fields: unmapped.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fields_defined > 0 && self.fields_mapped == self.fields_defined
    }
}

fn percent(part: usize, whole: usize) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part as u64) * Decimal::ONE_HUNDRED / Decimal::from(whole as u64)).round_dp(2)
}

/// Static coverage from rule existence
pub fn compute_coverage(catalog: &Catalog, snapshot: &RuleSnapshot, vendor: &str, data_type: DataType) -> CoverageReport {
    let resolver = MappingResolver::new(snapshot);
    CoverageReport::build(vendor, data_type, catalog.template(data_type), |field| {
        resolver.has_active_rule(vendor, field, data_type)
    })
}

/// Static coverage of every template for one vendor
pub fn vendor_coverage(catalog: &Catalog, snapshot: &RuleSnapshot, vendor: &str) -> Vec<CoverageReport> {
    catalog
        .templates()
        .into_iter()
        .map(|template| compute_coverage(catalog, snapshot, vendor, template.data_type))
        .collect()
}

/// Dynamic coverage over a batch of records for one vendor and data type.
///
/// A field counts once any record got a value for it from a mapping rule;
/// values filled from call context do not count. Records for other vendors
/// or data types are ignored.
pub fn dynamic_coverage(
    catalog: &Catalog,
    vendor: &str,
    data_type: DataType,
    records: &[NormalizedRecord],
) -> CoverageReport {
    let produced: HashSet<&str> = records
        .iter()
        .filter(|r| r.vendor == vendor && r.data_type == data_type)
        .flat_map(|r| r.fields.iter())
        .filter(|f| f.result.outcome.is_success() && f.result.mapping_id.is_some())
        .map(|f| f.field_name.as_str())
        .collect();

    CoverageReport::build(vendor, data_type, catalog.template(data_type), |field| {
        produced.contains(field)
    })
}

#[derive(Debug, Default)]
struct Tally {
    records: u64,
    successes: HashMap<String, u64>,
}

/// Running dynamic coverage over live traffic
///
/// Safe to feed from many threads at once.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    tallies: DashMap<(String, DataType), Tally>,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one normalized record
    pub fn observe(&self, record: &NormalizedRecord) {
        let mut tally = self
            .tallies
            .entry((record.vendor.clone(), record.data_type))
            .or_default();

        tally.records += 1;
        for field in &record.fields {
            if field.result.outcome.is_success() && field.result.mapping_id.is_some() {
                *tally.successes.entry(field.field_name.clone()).or_default() += 1;
            }
        }
    }

    /// Records observed for a vendor and data type
    pub fn records_observed(&self, vendor: &str, data_type: DataType) -> u64 {
        self.tallies
            .get(&(vendor.to_string(), data_type))
            .map(|t| t.records)
            .unwrap_or(0)
    }

    /// Times a field got a value from a rule, per field
    pub fn field_successes(&self, vendor: &str, data_type: DataType) -> HashMap<String, u64> {
        self.tallies
            .get(&(vendor.to_string(), data_type))
            .map(|t| t.successes.clone())
            .unwrap_or_default()
    }

    /// Dynamic coverage report from everything observed so far
    pub fn report(&self, catalog: &Catalog, vendor: &str, data_type: DataType) -> CoverageReport {
        let successes = self.field_successes(vendor, data_type);
        CoverageReport::build(vendor, data_type, catalog.template(data_type), |field| {
            successes.contains_key(field)
        })
    }

    pub fn reset(&self) {
        self.tallies.clear();
    }
}
