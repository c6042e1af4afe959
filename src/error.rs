use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Join key column absent from a table
    #[error("Missing key column '{column}' in {table}")]
    MissingKey { table: String, column: String },

    /// Expected column missing or a cell that does not fit the schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Key appears more than once where it must be unique
    #[error("Duplicate key '{key}' in {table} (join would fan out)")]
    DuplicateKey { table: String, key: String },

    /// Category value not seen when the mapping was fitted (strict mode only)
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    /// Training and scoring tables were encoded with different category mappings
    #[error("Category mapping mismatch: expected fingerprint {expected}, found {found}")]
    MappingMismatch { expected: String, found: String },

    /// Not enough rows to train or split
    #[error("Insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Model fitting failed
    #[error("Training error: {0}")]
    Training(String),

    /// Prediction requested from an unfitted model
    #[error("Model not trained: {0}")]
    NotTrained(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Delimited file errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            PipelineError::MissingKey { .. } => "MISSING_KEY",
            PipelineError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            PipelineError::DuplicateKey { .. } => "DUPLICATE_KEY",
            PipelineError::UnknownCategory { .. } => "UNKNOWN_CATEGORY",
            PipelineError::MappingMismatch { .. } => "MAPPING_MISMATCH",
            PipelineError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            PipelineError::Training(_) => "TRAINING_ERROR",
            PipelineError::NotTrained(_) => "NOT_TRAINED",
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::Csv(_) => "CSV_ERROR",
            PipelineError::Io(_) => "IO_ERROR",
            PipelineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn missing_key(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::MissingKey {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn duplicate_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        PipelineError::DuplicateKey {
            table: table.into(),
            key: key.into(),
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PipelineError::missing_key("features", "adshex").error_code(),
            "MISSING_KEY"
        );
        assert_eq!(
            PipelineError::SchemaMismatch("test".to_string()).error_code(),
            "SCHEMA_MISMATCH"
        );
        assert_eq!(
            PipelineError::duplicate_key("labels", "A1").error_code(),
            "DUPLICATE_KEY"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::duplicate_key("labels", "A1B2C3");
        assert_eq!(
            err.to_string(),
            "Duplicate key 'A1B2C3' in labels (join would fan out)"
        );

        let err = PipelineError::InsufficientData {
            required: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 2 rows, got 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = PipelineError::from(io_error);
        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
