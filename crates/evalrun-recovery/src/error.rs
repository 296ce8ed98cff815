//! Error types for result recovery.

use thiserror::Error;

/// Reasons no outcomes could be recovered from a log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// The results marker never appeared in the log.
    #[error("no \"{0}\" marker found in log")]
    MarkerNotFound(&'static str),

    /// The marker was found but no array follows it.
    #[error("no array found after results marker")]
    ArrayNotFound,

    /// The array opened after the marker is never closed.
    #[error("could not find matching closing bracket for results array")]
    Unbalanced,

    /// All parse tiers failed and no task identifiers could be salvaged.
    #[error("could not extract any results from block ({0})")]
    NothingSalvaged(String),
}
