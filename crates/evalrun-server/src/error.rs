//! Error types for the orchestrator server.

use std::path::PathBuf;

use evalrun_core::{CoreError, SessionId};
use evalrun_recovery::RecoveryError;
use evalrun_supervisor::SupervisorError;
use thiserror::Error;

/// Errors from the filesystem session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session directory for this id.
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed record '{path}': {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A stored session rejected the requested change.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors while turning a session log into result records.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Result recovery failed: {0}")]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Request rejected before any side effect.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker could not be started. The session exists with status `error`.
    #[error("Failed to launch worker for {session_id}: {source}")]
    Launch {
        session_id: SessionId,
        source: SupervisorError,
    },

    /// No live worker is registered for this session.
    #[error("Session is not running: {0}")]
    NotRunning(SessionId),
}
