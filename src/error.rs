//! Error types for Synheart Glucose

use thiserror::Error;

/// Errors that can occur during computation
///
/// Ordinary data-quality conditions (empty logs, no baseline, too few curves)
/// never surface here; they resolve to empty collections or `None`.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse log payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Reasons an individual log record is rejected during ingestion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("glucose value must be a positive number, got {0}")]
    InvalidGlucose(f64),

    #[error("carbohydrate grams must be a non-negative number, got {0}")]
    InvalidCarbs(f64),

    #[error("calories must be a non-negative number, got {0}")]
    InvalidCalories(f64),

    #[error("insulin units must be a non-negative number, got {0}")]
    InvalidUnits(f64),

    #[error("malformed record: {0}")]
    Malformed(String),
}
