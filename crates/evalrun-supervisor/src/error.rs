//! Error types for worker supervision.

use thiserror::Error;

/// Errors that can occur while launching or supervising the worker.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Failed to spawn the worker process.
    #[error("Failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A standard stream was not captured.
    #[error("Failed to capture worker {0}")]
    StreamUnavailable(&'static str),

    /// Waiting for the worker to exit failed.
    #[error("Failed to wait for worker: {0}")]
    Wait(#[source] std::io::Error),

    /// The log sink rejected a chunk.
    #[error("Log sink error: {0}")]
    Sink(String),
}
