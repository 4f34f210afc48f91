//! Controller error types.

use thiserror::Error;

use fleetscale_policy::PolicyError;
use fleetscale_provider::ProviderError;
use fleetscale_state::StateError;

/// Errors surfaced by a fleet controller.
///
/// Individual provider-call failures during a cycle are not errors; they
/// are collected in the cycle's `ReconciliationResult`.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("unknown fleet: {0}")]
    UnknownFleet(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("scaling cycle task failed: {0}")]
    Task(String),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
