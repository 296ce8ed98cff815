//! Error types for the evalrun client.

use std::time::Duration;

use evalrun_core::{SessionOutcome, Verdict};
use thiserror::Error;

/// Errors that can occur when talking to the server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server rejected the request.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors that end a watch early.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The session disappeared while being watched.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The configured timeout elapsed before consensus.
    #[error("no completion after {polls} polls ({elapsed:?}), last verdict {verdict:?}")]
    Timeout {
        polls: u32,
        elapsed: Duration,
        verdict: Verdict,
        outcome: SessionOutcome,
    },
}
