//! Engine error types

use serde::Serialize;
use thiserror::Error;

/// Engine-wide error type
///
/// Field-level problems (absent paths, failed transformations, fields nobody
/// mapped) are never errors; they are recorded as outcomes on the normalized
/// record. Only configuration and storage failures surface here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid mapping spec (mapping {mapping_id}): {reason}")]
    InvalidMappingSpec { mapping_id: i64, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for a rule that failed load-time validation
    pub fn invalid_spec(mapping_id: i64, reason: impl Into<String>) -> Self {
        EngineError::InvalidMappingSpec {
            mapping_id,
            reason: reason.into(),
        }
    }

    /// Stable code reported to consumers
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidMappingSpec { .. } => "INVALID_MAPPING_SPEC",
            EngineError::Database(_) => "DATABASE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Io(_) => "IO_ERROR",
        }
    }
}

/// Serializable error response for monitoring and export consumers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        ErrorResponse::from(&err)
    }
}

impl serde::Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(EngineError::invalid_spec(7, "unknown op 'frobnicate'"));
        assert_eq!(response.code, "INVALID_MAPPING_SPEC");
        assert!(response.message.contains("mapping 7"));
        assert!(response.message.contains("frobnicate"));

        let response = ErrorResponse::from(EngineError::NotFound("vendor kraken".to_string()));
        assert_eq!(response.code, "NOT_FOUND");
    }

    #[test]
    fn test_serialized_error_keeps_variant_code() {
        let json = serde_json::to_value(EngineError::Config("log_filter must not be empty".to_string())).unwrap();
        assert_eq!(json["code"], "CONFIG_ERROR");
        assert_eq!(json["message"], "Configuration error: log_filter must not be empty");

        let json = serde_json::to_value(EngineError::invalid_spec(3, "bad path")).unwrap();
        assert_eq!(json["code"], "INVALID_MAPPING_SPEC");
    }
}
