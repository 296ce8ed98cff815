//! Completion consensus for polling consumers.
//!
//! Three signals are updated independently and may be stale or arrive out of
//! order: a completion line in the log, the `completed` status in metadata and
//! the number of materialized results. A session is only reported done once
//! the process has finished *and* results exist, so a poller never shows
//! "done, 0 results" while the post-exit parse is still running.

use serde::{Deserialize, Serialize};

use crate::SessionStatus;

/// Log lines written when the worker process exits.
pub const COMPLETION_MARKERS: &[&str] = &[
    "Evaluation completed successfully",
    "Evaluation completed with exit code",
];

/// Whether a log snapshot contains a completion line.
pub fn log_has_completion_marker(log: &str) -> bool {
    log.lines()
        .any(|line| COMPLETION_MARKERS.iter().any(|marker| line.contains(marker)))
}

/// Signals observed in a single poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSignals {
    /// A completion line was present in the log.
    pub log_marker: bool,

    /// Status from metadata, if it could be read.
    pub status: Option<SessionStatus>,

    /// Number of materialized results.
    pub result_count: usize,

    /// Every configured task has a result.
    pub all_tasks_reported: bool,
}

impl CompletionSignals {
    /// Gather signals from one cycle's raw observations.
    ///
    /// `expected_tasks` is the session's task list when known; results for ids
    /// outside it do not count towards `all_tasks_reported`.
    pub fn observe<'a>(
        log: Option<&str>,
        status: Option<SessionStatus>,
        result_ids: impl IntoIterator<Item = &'a str>,
        expected_tasks: Option<&[String]>,
    ) -> Self {
        let result_ids: Vec<&str> = result_ids.into_iter().collect();
        let all_tasks_reported = match expected_tasks {
            Some(tasks) if !tasks.is_empty() => tasks
                .iter()
                .all(|task| result_ids.iter().any(|id| *id == task.as_str())),
            _ => false,
        };

        Self {
            log_marker: log.is_some_and(log_has_completion_marker),
            status,
            result_count: result_ids.len(),
            all_tasks_reported,
        }
    }

    /// Process-level completion: the worker is known to have finished.
    pub fn process_complete(&self) -> bool {
        self.log_marker || self.status == Some(SessionStatus::Completed) || self.all_tasks_reported
    }

    /// Combine the signals into a single decision.
    pub fn verdict(&self) -> Verdict {
        if self.process_complete() && self.result_count > 0 {
            Verdict::Done
        } else if self.status == Some(SessionStatus::Error) {
            Verdict::Failed
        } else if self.process_complete() {
            Verdict::Finalizing
        } else {
            Verdict::Running
        }
    }
}

/// Poll-cycle decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Worker still running.
    Running,
    /// Worker finished but no results yet; keep polling.
    Finalizing,
    /// Worker finished and results are available; stop polling.
    Done,
    /// Session reached `error`; results will never appear.
    Failed,
}

impl Verdict {
    /// Whether a poller should stop after this cycle.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}
