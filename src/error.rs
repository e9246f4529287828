//! Error types for rust_scmetrics

use thiserror::Error;

/// Main error type for metric evaluation
#[derive(Error, Debug)]
pub enum MetricError {
    /// A collaborator broke the evaluation contract (bad model binding,
    /// unsupported score shape, missing extras, misaligned cells).
    #[error("Contract violation: {reason}")]
    ContractViolation { reason: String },

    /// An input or dataset name could not be resolved.
    #[error("Lookup failed: {reason}")]
    LookupFailure { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid expression table: {reason}")]
    InvalidTable { reason: String },

    #[error("Invalid distribution: {reason}")]
    InvalidDistribution { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    /// Failure raised by a model or scoring routine outside this crate,
    /// passed through untouched.
    #[error(transparent)]
    Upstream(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MetricError {
    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        MetricError::ContractViolation {
            reason: reason.into(),
        }
    }
}

/// Result type alias for metric operations
pub type Result<T> = std::result::Result<T, MetricError>;
