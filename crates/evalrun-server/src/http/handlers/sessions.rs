//! Evaluation session handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use evalrun_core::api::{
    CancelResponse, DeleteResponse, ExportBundle, ResultEntry, SessionSummary,
    StartEvaluationRequest, StartEvaluationResponse, StatusResponse,
};
use evalrun_core::SessionId;
use serde::Deserialize;
use tracing::{debug, info};

use crate::http::error::ApiError;
use crate::orchestrator;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<SessionId, ApiError> {
    SessionId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid session ID".to_string()))
}

/// Start a new evaluation.
pub async fn start_evaluation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartEvaluationRequest>,
) -> Result<Json<StartEvaluationResponse>, ApiError> {
    let session = orchestrator::start_evaluation(&state, req).await?;
    Ok(Json(StartEvaluationResponse {
        session_id: session.id,
    }))
}

/// List sessions, newest first.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    Ok(Json(state.store.list_sessions().await?))
}

/// Current log text.
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let log = state.store.read_log(&id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], log))
}

/// Status from metadata. Reported as running while metadata is missing or
/// unreadable.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = parse_id(&id)?;
    if !state.store.exists(&id).await {
        return Err(ApiError::NotFound(format!("Session not found: {id}")));
    }

    let status = match state.store.read_session(&id).await {
        Ok(session) => StatusResponse::from(&session),
        Err(e) => {
            debug!(session_id = %id, error = %e, "Metadata unavailable, reporting running");
            StatusResponse::pending()
        }
    };
    Ok(Json(status))
}

/// Materialized results with their pass/fail label.
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ResultEntry>>, ApiError> {
    let id = parse_id(&id)?;
    let results = state.store.list_task_results(&id).await?;
    Ok(Json(results.into_iter().map(ResultEntry::from).collect()))
}

/// Metadata, results and log as one downloadable document.
pub async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let metadata = state.store.read_session(&id).await?;
    let results = state.store.list_task_results(&id).await?;
    let logs = state.store.read_log(&id).await?;

    let disposition = format!("attachment; filename=\"{id}-results.json\"");
    let bundle = ExportBundle {
        session_id: id,
        metadata,
        results,
        logs,
        exported_at: Utc::now(),
    };
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(bundle)))
}

/// Delete a session and everything it owns.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_id(&id)?;
    orchestrator::delete_evaluation(&state, &id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Session {id} deleted successfully"),
    }))
}

/// Kill a running worker.
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = parse_id(&id)?;
    orchestrator::cancel_evaluation(&state, &id).await?;
    Ok(Json(CancelResponse {
        session_id: id,
        cancelled: true,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReprocessParams {
    #[serde(default)]
    pub force: bool,
}

/// Re-run result recovery over a stored log.
pub async fn reprocess_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ReprocessParams>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let response = orchestrator::reprocess_session(&state, &id, params.force).await?;
    info!(
        session_id = %id,
        recovered = response.recovered,
        skipped = response.skipped,
        "Reprocess requested"
    );
    Ok(Json(response))
}
