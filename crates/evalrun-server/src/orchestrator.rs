//! Session lifecycle: start, supervise, cancel, delete, reprocess.
//!
//! `start_evaluation` returns as soon as metadata is persisted and the worker
//! is spawned. Everything after that runs in a detached task whose only
//! outputs are store writes and tracing events:
//!
//! 1. worker output is streamed into the session log,
//! 2. a completion (or error) line is appended on exit,
//! 3. result recovery runs exactly once, best effort,
//! 4. metadata moves to `completed` (any exit) or `error` (wait failure).
//!
//! A recovery failure does not change the final status. `completed` only
//! means the worker finished; consumers tell "completed with results" from
//! "completed without results" by counting results
//! ([`SessionOutcome`](evalrun_core::SessionOutcome)).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use evalrun_core::api::{ReprocessResponse, StartEvaluationRequest};
use evalrun_core::model::{resolve_model, ResolvedModel};
use evalrun_core::{LlmConfig, Provider, Session, SessionConfig, SessionId, SessionStatus};
use evalrun_supervisor::{ExitReport, LogSink, SupervisorError, WorkerCommand, WorkerProcess};
use tracing::{error, info, warn};

use crate::error::{MaterializeError, OrchestratorError};
use crate::llm_configs::load_llm_configs;
use crate::materializer::recover_session;
use crate::state::{AppState, LiveWorker};
use crate::store::SessionStore;

/// How long a delete waits for a cancelled worker's exit path.
const CANCEL_GRACE: Duration = Duration::from_secs(30);

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Log sink appending worker output to a session log.
struct SessionLog {
    store: Arc<SessionStore>,
    id: SessionId,
}

#[async_trait]
impl LogSink for SessionLog {
    async fn append(&self, chunk: &str) -> Result<(), SupervisorError> {
        self.store
            .append_log(&self.id, chunk)
            .await
            .map_err(|e| SupervisorError::Sink(e.to_string()))
    }
}

/// Append to the session log from a background step. Failures only reach
/// tracing since nobody is waiting for them.
async fn log_line(store: &SessionStore, id: &SessionId, text: &str) {
    if let Err(e) = store.append_log(id, text).await {
        warn!(session_id = %id, error = %e, "Failed to write session log");
    }
}

/// Record a failure before the worker ever ran, so pollers see `error`
/// instead of a session stuck in `running`.
async fn fail_session(store: &SessionStore, id: &SessionId, message: &str) {
    log_line(
        store,
        id,
        &format!("\n[{}] Error running evaluation: {}\n", timestamp(), message),
    )
    .await;
    if let Err(e) = store
        .update_status(id, SessionStatus::Error, Utc::now())
        .await
    {
        warn!(session_id = %id, error = %e, "Failed to record session failure");
    }
}

/// Build the worker invocation for a session.
pub fn worker_command(
    state: &AppState,
    config: &SessionConfig,
    resolved: &ResolvedModel,
) -> WorkerCommand {
    let worker = &state.config.worker;
    let mut command = WorkerCommand::new(worker.interpreter())
        .arg(worker.script.clone())
        .arg("launch")
        .args(["--tasks".to_string(), config.task_ids.join(",")])
        .args(["--max-iterations".to_string(), worker.max_iterations.to_string()])
        .with_env("WHITE_AGENT_MODEL", resolved.model.clone())
        .with_env("WHITE_AGENT_PROVIDER", resolved.provider.to_string())
        .with_env("WHITE_AGENT_TEMPERATURE", format!("{:.1}", worker.temperature));

    if resolved.provider == Provider::OpenAi {
        let key = resolved.api_key.clone().or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .and_then(|key| LlmConfig::new("env").with_api_key(key).api_key)
        });
        if let Some(key) = key {
            command = command.with_env("OPENAI_API_KEY", key);
        }
    }

    if let Some(dir) = &worker.working_dir {
        command = command.current_dir(dir);
    }
    command
}

/// Create a session and launch its worker.
///
/// Validation failures have no side effects. A launch failure leaves the
/// session on disk with status `error` and the failure in its log.
pub async fn start_evaluation(
    state: &Arc<AppState>,
    request: StartEvaluationRequest,
) -> Result<Session, OrchestratorError> {
    let config = SessionConfig::new(
        request.task_ids,
        request.agent_model_config,
        request.environment_model_config,
    )?;

    let store = &state.store;
    let session = store.create_session(config).await?;
    let id = session.id.clone();

    let configs = load_llm_configs(state.config.models.config_path.as_deref()).await;
    let resolved = resolve_model(&session.config.agent_model_config, &configs);
    let command = worker_command(state, &session.config, &resolved);

    let header = format!(
        "Evaluation started at {}\nTasks: {}\nAgent LLM: {}\nEnvironment LLM: {}\n\
         [{ts}] Model: {}, Provider: {}\n[{ts}] Command: {}\n",
        session.start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        session.config.task_ids.join(", "),
        session.config.agent_model_config,
        session.config.environment_model_config,
        resolved.model,
        resolved.provider,
        command.command_line(),
        ts = timestamp(),
    );
    if let Err(e) = store.append_log(&id, &header).await {
        error!(session_id = %id, error = %e, "Failed to write log header");
        fail_session(store, &id, &e.to_string()).await;
        return Err(e.into());
    }

    let worker = match command.spawn() {
        Ok(worker) => worker,
        Err(e) => {
            error!(session_id = %id, error = %e, "Worker launch failed");
            fail_session(store, &id, &e.to_string()).await;
            return Err(OrchestratorError::Launch {
                session_id: id,
                source: e,
            });
        }
    };

    let live = LiveWorker::default();
    state.live.write().await.insert(id.clone(), live.clone());

    info!(
        session_id = %id,
        pid = ?worker.id(),
        model = %resolved.model,
        provider = %resolved.provider,
        "Evaluation started"
    );

    tokio::spawn(supervise_session(state.clone(), id, worker, live));
    Ok(session)
}

/// Background half of a session: drain, annotate exit, recover, finish.
async fn supervise_session(
    state: Arc<AppState>,
    id: SessionId,
    worker: WorkerProcess,
    live: LiveWorker,
) {
    let store = &state.store;
    let sink: Arc<dyn LogSink> = Arc::new(SessionLog {
        store: store.clone(),
        id: id.clone(),
    });

    let status = match worker.supervise(sink, live.cancel.clone()).await {
        Ok(report) => {
            log_line(store, &id, &exit_line(&report)).await;
            SessionStatus::Completed
        }
        Err(e) => {
            error!(session_id = %id, error = %e, "Worker supervision failed");
            log_line(
                store,
                &id,
                &format!("\n[{}] Error running evaluation: {}\n", timestamp(), e),
            )
            .await;
            SessionStatus::Error
        }
    };

    match recover_session(store, &id).await {
        Ok(materialized) => {
            log_line(
                store,
                &id,
                &format!(
                    "[{}] Recovered {} result(s) ({})\n",
                    timestamp(),
                    materialized.results.len(),
                    materialized.tier
                ),
            )
            .await;
        }
        Err(e) => {
            warn!(session_id = %id, error = %e, "No results recovered");
            log_line(store, &id, &format!("[{}] {}\n", timestamp(), e)).await;
        }
    }

    if let Err(e) = store.update_status(&id, status, Utc::now()).await {
        warn!(session_id = %id, error = %e, "Failed to update session status");
    }

    state.live.write().await.remove(&id);
    live.finished.cancel();
    info!(session_id = %id, status = %status, "Session finished");
}

fn exit_line(report: &ExitReport) -> String {
    let ts = timestamp();
    let mut line = String::new();
    if report.cancelled {
        line.push_str(&format!("\n[{ts}] Evaluation cancelled"));
    }
    match report.exit_code {
        Some(0) => line.push_str(&format!("\n[{ts}] Evaluation completed successfully\n")),
        Some(code) => {
            line.push_str(&format!("\n[{ts}] Evaluation completed with exit code {code}\n"))
        }
        None => line.push_str(&format!(
            "\n[{ts}] Evaluation completed with exit code none (terminated by signal)\n"
        )),
    }
    line
}

/// Kill a running worker. The normal exit path still runs afterwards.
pub async fn cancel_evaluation(state: &AppState, id: &SessionId) -> Result<(), OrchestratorError> {
    let live = state
        .live_worker(id)
        .await
        .ok_or_else(|| OrchestratorError::NotRunning(id.clone()))?;
    info!(session_id = %id, "Cancelling evaluation");
    live.cancel.cancel();
    Ok(())
}

/// Delete a session, cancelling its worker first if it is still running.
pub async fn delete_evaluation(state: &AppState, id: &SessionId) -> Result<(), OrchestratorError> {
    if let Some(live) = state.live_worker(id).await {
        info!(session_id = %id, "Cancelling running evaluation before delete");
        live.cancel.cancel();
        if tokio::time::timeout(CANCEL_GRACE, live.finished.cancelled())
            .await
            .is_err()
        {
            warn!(session_id = %id, "Worker did not finish in time, deleting anyway");
        }
    }
    state.store.delete_session(id).await?;
    Ok(())
}

/// Re-run recovery and materialization for a finished session.
///
/// Sessions that already have results or whose metadata still says `running`
/// are skipped unless `force` is set. Sessions with a live worker in this
/// process are always skipped. A recovery failure yields
/// `recovered: 0`, not an error.
pub async fn reprocess_session(
    state: &AppState,
    id: &SessionId,
    force: bool,
) -> Result<ReprocessResponse, OrchestratorError> {
    let skipped = |session_id: &SessionId| ReprocessResponse {
        session_id: session_id.clone(),
        recovered: 0,
        skipped: true,
    };

    if state.live_worker(id).await.is_some() {
        info!(session_id = %id, "Session still running, not reprocessing");
        return Ok(skipped(id));
    }

    // The worker may belong to another process, so the live map alone is
    // not enough.
    match state.store.read_session(id).await {
        Ok(session) if session.status == SessionStatus::Running && !force => {
            info!(session_id = %id, "Session metadata says running, not reprocessing");
            return Ok(skipped(id));
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => return Err(e.into()),
        Err(e) => warn!(session_id = %id, error = %e, "Metadata unreadable, reprocessing anyway"),
    }

    let existing = state.store.list_task_results(id).await?;
    if !existing.is_empty() && !force {
        info!(session_id = %id, existing = existing.len(), "Session already has results");
        return Ok(skipped(id));
    }

    let recovered = match recover_session(&state.store, id).await {
        Ok(materialized) => materialized.results.len(),
        Err(MaterializeError::Recovery(e)) => {
            warn!(session_id = %id, error = %e, "Reprocessing recovered nothing");
            0
        }
        Err(MaterializeError::Store(e)) => return Err(e.into()),
    };

    Ok(ReprocessResponse {
        session_id: id.clone(),
        recovered,
        skipped: false,
    })
}

/// Reprocess every session on disk, newest first.
pub async fn reprocess_all(
    state: &AppState,
    force: bool,
) -> Result<Vec<ReprocessResponse>, OrchestratorError> {
    let mut responses = Vec::new();
    for id in state.store.list_session_ids().await? {
        match reprocess_session(state, &id, force).await {
            Ok(response) => responses.push(response),
            Err(e) => warn!(session_id = %id, error = %e, "Failed to reprocess session"),
        }
    }
    Ok(responses)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use evalrun_core::ResultLabel;
    use std::path::Path;

    const RESULTS_SCRIPT: &str = r#"
echo "model=$WHITE_AGENT_MODEL provider=$WHITE_AGENT_PROVIDER temp=$WHITE_AGENT_TEMPERATURE args=$*"
echo "working on it" 1>&2
echo 'Detailed Results: [{"task_name": "t1", "success": true, "time_used": 1.2}, {"task_name": "t2", "success": false, "time_used": 0.5}]'
"#;

    fn state_with_script(dir: &Path, script: &str) -> Arc<AppState> {
        let script_path = dir.join("worker.sh");
        std::fs::write(&script_path, script).unwrap();

        let mut config = Config::default();
        config.server.sessions_dir = dir.join("sessions");
        config.worker.program = "sh".to_string();
        config.worker.venv_python = None;
        config.worker.script = script_path.to_string_lossy().into_owned();
        AppState::new(config)
    }

    fn request(tasks: &[&str]) -> StartEvaluationRequest {
        StartEvaluationRequest {
            task_ids: tasks.iter().map(|t| t.to_string()).collect(),
            agent_model_config: "openai/gpt-4o".to_string(),
            environment_model_config: "ollama/llama3.2:latest".to_string(),
        }
    }

    async fn wait_for_terminal(state: &AppState, id: &SessionId) -> Session {
        for _ in 0..200 {
            let session = state.store.read_session(id).await.unwrap();
            if session.status.is_terminal() && state.live_worker(id).await.is_none() {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("session {id} did not finish");
    }

    #[tokio::test]
    async fn test_end_to_end_with_results() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), RESULTS_SCRIPT);

        let session = start_evaluation(&state, request(&["t1", "t2"])).await.unwrap();
        let finished = wait_for_terminal(&state, &session.id).await;
        assert_eq!(finished.status, SessionStatus::Completed);
        assert!(finished.end_time.is_some());

        let results = state.store.list_task_results(&session.id).await.unwrap();
        assert_eq!(results.len(), 2);
        let t1 = results.iter().find(|r| r.task_id == "t1").unwrap();
        let t2 = results.iter().find(|r| r.task_id == "t2").unwrap();
        assert_eq!((t1.label(), t1.score), (ResultLabel::Success, 100));
        assert_eq!((t2.label(), t2.score), (ResultLabel::Failure, 0));

        let log = state.store.read_log(&session.id).await.unwrap();
        assert!(log.starts_with("Evaluation started at "));
        assert!(log.contains("Tasks: t1, t2\n"));
        assert!(log.contains("Model: gpt-4o, Provider: openai"));
        assert!(log.contains("--tasks \"t1,t2\" --max-iterations 30"));
        assert!(log.contains("model=gpt-4o provider=openai temp=0.0"));
        assert!(log.contains("working on it"));
        assert!(log.contains("Evaluation completed successfully"));
    }

    #[tokio::test]
    async fn test_parse_failure_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo no results here\nexit 2\n");

        let session = start_evaluation(&state, request(&["t1"])).await.unwrap();
        let finished = wait_for_terminal(&state, &session.id).await;

        assert_eq!(finished.status, SessionStatus::Completed);
        assert!(state.store.list_task_results(&session.id).await.unwrap().is_empty());
        let log = state.store.read_log(&session.id).await.unwrap();
        assert!(log.contains("Evaluation completed with exit code 2"));
    }

    #[tokio::test]
    async fn test_launch_failure_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.sessions_dir = dir.path().join("sessions");
        config.worker.program = "/definitely/not/python".to_string();
        config.worker.venv_python = None;
        let state = AppState::new(config);

        let err = start_evaluation(&state, request(&["t1"])).await.unwrap_err();
        let session_id = match err {
            OrchestratorError::Launch { session_id, .. } => session_id,
            other => panic!("expected launch error, got {other:?}"),
        };

        let session = state.store.read_session(&session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Error);
        let log = state.store.read_log(&session_id).await.unwrap();
        assert!(log.contains("Error running evaluation"));
        assert_eq!(state.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_task_list_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), RESULTS_SCRIPT);

        let err = start_evaluation(&state, request(&[])).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Invalid(_)));
        assert!(state.store.list_session_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_follows_normal_exit_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "echo started\nexec sleep 30\n");

        let session = start_evaluation(&state, request(&["t1"])).await.unwrap();
        cancel_evaluation(&state, &session.id).await.unwrap();
        let finished = wait_for_terminal(&state, &session.id).await;

        assert_eq!(finished.status, SessionStatus::Completed);
        let log = state.store.read_log(&session.id).await.unwrap();
        assert!(log.contains("Evaluation cancelled"));
        assert!(log.contains("Evaluation completed with exit code"));

        let err = cancel_evaluation(&state, &session.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_delete_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), "exec sleep 30\n");

        let session = start_evaluation(&state, request(&["t1"])).await.unwrap();
        delete_evaluation(&state, &session.id).await.unwrap();

        assert!(!state.store.exists(&session.id).await);
        assert_eq!(state.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_failure_before_launch_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), RESULTS_SCRIPT);
        let config = SessionConfig::new(["t1"], "a", "b").unwrap();
        let session = state.store.create_session(config).await.unwrap();

        fail_session(&state.store, &session.id, "disk full").await;

        let read = state.store.read_session(&session.id).await.unwrap();
        assert_eq!(read.status, SessionStatus::Error);
        assert!(read.end_time.is_some());
        let log = state.store.read_log(&session.id).await.unwrap();
        assert!(log.contains("Error running evaluation: disk full"));
    }

    #[tokio::test]
    async fn test_reprocess_recovers_missing_results() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_script(dir.path(), RESULTS_SCRIPT);

        // A historical session whose results were never extracted.
        let config = SessionConfig::new(["t1", "t2"], "a", "b").unwrap();
        let session = state.store.create_session(config).await.unwrap();
        state
            .store
            .append_log(
                &session.id,
                "Detailed Results: [{\"task_name\": \"t1\", \"success\": true, \"time_used\": 2.0}]\n",
            )
            .await
            .unwrap();

        // Metadata still says running, as when another process supervises it.
        let running = reprocess_session(&state, &session.id, false).await.unwrap();
        assert!(running.skipped);
        assert!(state.store.list_task_results(&session.id).await.unwrap().is_empty());

        state
            .store
            .update_status(&session.id, SessionStatus::Completed, Utc::now())
            .await
            .unwrap();
        let response = reprocess_session(&state, &session.id, false).await.unwrap();
        assert!(!response.skipped);
        assert_eq!(response.recovered, 1);

        let again = reprocess_session(&state, &session.id, false).await.unwrap();
        assert!(again.skipped);

        let forced = reprocess_all(&state, true).await.unwrap();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].recovered, 1);
        assert_eq!(state.store.list_task_results(&session.id).await.unwrap().len(), 1);
    }
}
