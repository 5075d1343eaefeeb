use thiserror::Error;

/// Application-level errors surfaced by the host process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised by the reasoning core.
///
/// `Validation` and `NotFound` reach the caller; `ExternalServiceUnavailable`
/// is recovered inside the responder and only shows up in answer text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Cannot explain: unknown concept '{concept_id}'")]
    NotFound { concept_id: String },

    #[error("External service unavailable: {service} - {message}")]
    ExternalServiceUnavailable { service: String, message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an unreachable external capability.
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::ExternalServiceUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether the responder should fall back instead of failing.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            EngineError::ExternalServiceUnavailable { .. } | EngineError::Cancelled
        )
    }
}

/// Errors from the fast calculator pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Malformed metric {name}: {value} is outside [0, 1]")]
    MalformedMetric { name: String, value: f64 },

    #[error("No metrics supplied")]
    MissingMetrics,

    #[error("Symbolic evaluation failed: {message}")]
    Symbolic { message: String },
}

impl From<CalcError> for EngineError {
    fn from(err: CalcError) -> Self {
        EngineError::Validation {
            field: "metrics".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Snapshot and audit-log persistence errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for reasoning core operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
