//! Session status and the user-visible outcome derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status persisted in session metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Worker launched (or about to be) and not yet finished.
    #[default]
    Running,
    /// Worker process exited. Says nothing about whether results were recovered.
    Completed,
    /// Worker could not be launched or supervised.
    Error,
}

impl SessionStatus {
    /// Returns true if the session is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Only `running -> completed` and `running -> error` are allowed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four states a dashboard has to render distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Running,
    CompletedWithResults,
    /// The worker finished but no results could be recovered from its log.
    /// This is not the same thing as "every task failed".
    CompletedWithoutResults,
    Error,
}

impl SessionOutcome {
    /// Classify a session from its status and materialized result count.
    pub fn classify(status: SessionStatus, result_count: usize) -> Self {
        match status {
            SessionStatus::Running => Self::Running,
            SessionStatus::Error => Self::Error,
            SessionStatus::Completed if result_count > 0 => Self::CompletedWithResults,
            SessionStatus::Completed => Self::CompletedWithoutResults,
        }
    }
}
