//! Policy error types.

use thiserror::Error;

/// Errors raised before or while computing a scaling decision.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("invalid metrics: {0}")]
    InvalidMetrics(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("invalid budget: {0}")]
    InvalidBudget(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
