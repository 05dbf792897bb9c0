use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A peer rejected during completeness screening, with the exact fields
/// that were missing. Carried inside `InsufficientData` so callers can
/// render messages like "3 of 8 candidate peers lack EBITDA".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerExclusion {
    pub peer: String,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {reason}")]
    InsufficientData {
        reason: String,
        exclusions: Vec<PeerExclusion>,
    },

    #[error("Numerical failure: {function} exhausted {attempts} attempts (last delta: {last_delta})")]
    NumericalFailure {
        function: String,
        attempts: u32,
        last_delta: Decimal,
    },

    #[error("Sources/uses mismatch: sources {total_sources} vs uses {total_uses} (difference {difference} exceeds tolerance {tolerance})")]
    ReconciliationMismatch {
        total_sources: Decimal,
        total_uses: Decimal,
        difference: Decimal,
        tolerance: Decimal,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ValuationError {
    /// Shorthand for an `InsufficientData` error with no peer breakdown.
    pub fn insufficient(reason: impl Into<String>) -> Self {
        ValuationError::InsufficientData {
            reason: reason.into(),
            exclusions: Vec::new(),
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
