//! Core domain errors.

use thiserror::Error;

/// Core domain errors for evalrun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id does not follow the `eval-<millis>` convention.
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
