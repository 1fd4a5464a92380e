//! Mapping rules
//!
//! Rules link one vendor's raw field path to one canonical field. They are
//! authored and stored elsewhere (see `db::sqlite`); this module validates
//! them into immutable snapshots and selects candidates per canonical field.

mod resolver;
mod store;
mod transform;
mod types;

pub use resolver::{MappingResolver, NoMappingDefined};
pub use store::{MappingStore, RuleSnapshot};
pub use transform::{EpochUnit, TransformOp, TransformSpec};
pub use types::{MappingRule, RawMappingRule, SourceType};
