//! Polling a session until it is done.
//!
//! Every cycle reads the log, the metadata status and the materialized results,
//! then applies the completion rule from [`evalrun_core::consensus`]. The
//! watcher stops on [`Verdict::Done`] or [`Verdict::Failed`], when the session
//! disappears, or when an optional timeout elapses. Stopping never affects the
//! worker process.

use std::time::Duration;

use async_trait::async_trait;
use evalrun_core::api::{ResultEntry, StatusResponse};
use evalrun_core::{CompletionSignals, SessionOutcome, Verdict};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ClientError, WatchError};
use crate::http::HttpClient;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Read access to the three signals of a session.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn log(&self, session_id: &str) -> Result<String, ClientError>;

    async fn status(&self, session_id: &str) -> Result<StatusResponse, ClientError>;

    async fn results(&self, session_id: &str) -> Result<Vec<ResultEntry>, ClientError>;
}

#[async_trait]
impl SessionProbe for HttpClient {
    async fn log(&self, session_id: &str) -> Result<String, ClientError> {
        self.logs(session_id).await
    }

    async fn status(&self, session_id: &str) -> Result<StatusResponse, ClientError> {
        HttpClient::status(self, session_id).await
    }

    async fn results(&self, session_id: &str) -> Result<Vec<ResultEntry>, ClientError> {
        HttpClient::results(self, session_id).await
    }
}

/// What one poll cycle observed.
#[derive(Debug, Clone)]
pub struct Poll {
    pub cycle: u32,
    pub signals: CompletionSignals,
    pub verdict: Verdict,
}

/// Final state of a watch.
#[derive(Debug, Clone)]
pub struct WatchReport {
    pub verdict: Verdict,
    pub outcome: SessionOutcome,
    pub results: Vec<ResultEntry>,
    pub polls: u32,
}

/// User-visible outcome implied by a cycle's signals.
pub fn outcome_of(signals: &CompletionSignals) -> SessionOutcome {
    match signals.verdict() {
        Verdict::Done => SessionOutcome::CompletedWithResults,
        Verdict::Failed => SessionOutcome::Error,
        Verdict::Finalizing => SessionOutcome::CompletedWithoutResults,
        Verdict::Running => SessionOutcome::Running,
    }
}

/// Polls a session with the completion rule.
pub struct Watcher<P> {
    probe: P,
    interval: Duration,
    timeout: Option<Duration>,
    expected_tasks: Option<Vec<String>>,
}

impl<P: SessionProbe> Watcher<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            expected_tasks: None,
        }
    }

    /// Builder method to set the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Builder method to give up after `timeout`. No timeout by default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder method to set the session's task list, enabling the
    /// all-tasks-reported signal.
    pub fn with_expected_tasks(mut self, tasks: Vec<String>) -> Self {
        self.expected_tasks = Some(tasks);
        self
    }

    /// Gather one cycle of signals. Transient read errors leave the
    /// corresponding signal empty; a missing session ends the watch.
    pub async fn poll_once(
        &self,
        session_id: &str,
    ) -> Result<(CompletionSignals, Vec<ResultEntry>), WatchError> {
        let status = match self.probe.status(session_id).await {
            Ok(status) => Some(status.status),
            Err(ClientError::NotFound(_)) => {
                return Err(WatchError::NotFound(session_id.to_string()))
            }
            Err(e) => {
                warn!(session_id, error = %e, "Status unavailable");
                None
            }
        };

        let log = match self.probe.log(session_id).await {
            Ok(log) => Some(log),
            Err(e) => {
                debug!(session_id, error = %e, "Log unavailable");
                None
            }
        };

        let results = match self.probe.results(session_id).await {
            Ok(results) => results,
            Err(e) => {
                warn!(session_id, error = %e, "Results unavailable");
                Vec::new()
            }
        };

        let signals = CompletionSignals::observe(
            log.as_deref(),
            status,
            results.iter().map(|r| r.task_id.as_str()),
            self.expected_tasks.as_deref(),
        );
        Ok((signals, results))
    }

    /// Poll until the verdict is final. `on_poll` sees every cycle.
    pub async fn watch<F>(&self, session_id: &str, mut on_poll: F) -> Result<WatchReport, WatchError>
    where
        F: FnMut(&Poll),
    {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let (signals, results) = self.poll_once(session_id).await?;
            let verdict = signals.verdict();
            debug!(session_id, cycle = polls, ?verdict, ?signals, "Poll");

            on_poll(&Poll {
                cycle: polls,
                signals: signals.clone(),
                verdict,
            });

            if verdict.is_final() {
                return Ok(WatchReport {
                    verdict,
                    outcome: outcome_of(&signals),
                    results,
                    polls,
                });
            }

            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(WatchError::Timeout {
                        polls,
                        elapsed,
                        verdict,
                        outcome: outcome_of(&signals),
                    });
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
