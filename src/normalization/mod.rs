//! Normalization
//!
//! Path resolution, the transformation pipeline, typed values and records,
//! and the orchestrator tying them together.

mod engine;
mod path;
pub mod pipeline;
mod record;
mod value;

pub use engine::{MappingTrace, NormalizationEngine, TraceEntry};
pub use path::{resolve, FieldPath, PathError, PathSegment};
pub use pipeline::{apply, TransformFailure, Transformed};
pub use record::{FieldDiagnostic, FieldOutcome, FieldResult, NormalizedRecord, RecordField};
pub use value::{parse_decimal, CanonicalValue};
