//! Canonical field normalization
//!
//! Turns vendor-specific exchange payloads (REST responses or WebSocket
//! messages) into uniform records keyed by canonical field names, driven by
//! declarative mapping rules with typed transformations.

pub mod catalog;
pub mod config;
pub mod coverage;
pub mod db;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod normalization;
pub mod state;

pub use catalog::{Catalog, DataType};
pub use config::EngineConfig;
pub use coverage::{CoverageReport, CoverageTracker};
pub use error::{EngineError, Result};
pub use mapping::{MappingStore, RawMappingRule, SourceType};
pub use normalization::{CanonicalValue, FieldOutcome, NormalizationEngine, NormalizedRecord};
pub use state::EngineState;
