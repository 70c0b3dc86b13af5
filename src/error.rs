use thiserror::Error;

use crate::lattice::CellId;

/// Failures raised by the core engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PottsError {
    /// Malformed coefficients, inconsistent dimensions or invalid seeds. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A committed change left the lattice and the cell locations out of agreement.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A behavioral module could not draw a finite waiting time.
    #[error("sampling exhaustion for cell {cell}: {reason}")]
    SamplingExhaustion { cell: CellId, reason: String },
}

impl PottsError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PottsError::Configuration(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        PottsError::InvariantViolation(message.into())
    }
}
