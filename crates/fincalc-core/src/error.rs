use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FincalcError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("No effective policy for region '{region}' on {date}")]
    ConfigNotFound { region: String, date: NaiveDate },

    #[error("Invalid bracket table: {0}")]
    InvalidBracketTable(String),

    #[error("Overlapping policy windows for region '{region}': window from {new_from} overlaps window from {existing_from}")]
    OverlappingPolicy {
        region: String,
        existing_from: NaiveDate,
        new_from: NaiveDate,
    },

    #[error("No convergence: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FincalcError {
    /// Shorthand for the most common validation failure.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FincalcError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FincalcError {
    fn from(e: serde_json::Error) -> Self {
        FincalcError::SerializationError(e.to_string())
    }
}
